//! In-process test context.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::context::{Cleanup, TestContext};

use super::report::{Outcome, TestReport};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Unwind payload used to leave a test body early.
///
/// Carries the test that asked to stop, so a stop caught by another test's
/// body can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Halt {
    test: u64,
    name: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// A running test with its log, cleanups and sub-test reports.
///
/// `fail_now` and `skip_now` leave the body by unwinding with a private
/// payload; [`LocalTest::run`] catches it, so they must be called from the
/// thread running the body. A stop that lands in a different test, such as a
/// sub-test calling `fatal` on an adapter over its parent, fails that test.
pub struct LocalTest {
    id: u64,
    name: String,
    failed: AtomicBool,
    skipped: AtomicBool,
    logs: Mutex<Vec<String>>,
    cleanups: Mutex<Vec<Cleanup>>,
    subtests: Mutex<Vec<TestReport>>,
}

impl LocalTest {
    fn new(name: String) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            failed: AtomicBool::new(false),
            skipped: AtomicBool::new(false),
            logs: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            subtests: Mutex::new(Vec::new()),
        }
    }

    /// Runs `body` as a test named `name` and reports how it ended.
    ///
    /// Cleanups run after the body returns, stops early or panics. A panic in
    /// the body is recorded as a failure; a panic in a cleanup is re-raised
    /// once the remaining cleanups have run.
    pub fn run<F>(name: impl Into<String>, body: F) -> TestReport
    where
        F: FnOnce(&LocalTest),
    {
        let test = LocalTest::new(name.into());
        let result = panic::catch_unwind(AssertUnwindSafe(|| body(&test)));
        test.absorb(result);

        if let Some(payload) = test.run_cleanups() {
            tracing::error!(test = %test.name, "cleanup panicked");
            panic::resume_unwind(payload);
        }

        let report = test.into_report();
        tracing::debug!(test = %report.name, outcome = ?report.outcome, "test finished");
        report
    }

    /// Runs a sub-test to completion and returns whether it passed.
    ///
    /// A failed sub-test marks this test as failed.
    pub fn run_subtest<F>(&self, name: &str, body: F) -> bool
    where
        F: FnOnce(&LocalTest),
    {
        let report = LocalTest::run(self.child_name(name), body);
        self.adopt(report)
    }

    /// Runs sub-tests concurrently and waits for all of them.
    ///
    /// Returns true if every sub-test passed.
    pub fn run_parallel<I, S, F>(&self, subtests: I) -> bool
    where
        I: IntoIterator<Item = (S, F)>,
        S: AsRef<str>,
        F: FnOnce(&LocalTest) + Send,
    {
        let reports: Vec<TestReport> = thread::scope(|scope| {
            let handles: Vec<_> = subtests
                .into_iter()
                .map(|(name, body)| {
                    let name = self.child_name(name.as_ref());
                    scope.spawn(move || LocalTest::run(name, body))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(report) => report,
                    Err(payload) => panic::resume_unwind(payload),
                })
                .collect()
        });

        reports
            .into_iter()
            .fold(true, |all_passed, report| self.adopt(report) && all_passed)
    }

    fn child_name(&self, name: &str) -> String {
        format!("{}/{}", self.name, name)
    }

    fn adopt(&self, report: TestReport) -> bool {
        let passed = report.passed();
        if !passed {
            self.failed.store(true, Ordering::SeqCst);
        }
        lock(&self.subtests).push(report);
        passed
    }

    fn push_log(&self, line: String) {
        tracing::info!(test = %self.name, "{}", line);
        lock(&self.logs).push(line);
    }

    /// Records the way a body or cleanup ended, handing back a real panic.
    fn absorb(&self, result: thread::Result<()>) -> Option<Box<dyn Any + Send>> {
        let Err(payload) = result else {
            return None;
        };

        if let Some(halt) = payload.downcast_ref::<Halt>() {
            if halt.test != self.id {
                self.failed.store(true, Ordering::SeqCst);
                self.push_log(format!(
                    "test {} was stopped from test {}; stop calls must target the running test",
                    halt.name, self.name
                ));
            }
            return None;
        }

        self.failed.store(true, Ordering::SeqCst);
        self.push_log(format!("panicked: {}", panic_message(payload.as_ref())));
        Some(payload)
    }

    /// Runs cleanups last-registered first and returns the first panic among them.
    fn run_cleanups(&self) -> Option<Box<dyn Any + Send>> {
        let mut escaped = None;
        loop {
            // the lock must be released before the callback registers more
            let next = lock(&self.cleanups).pop();
            let Some(f) = next else {
                break;
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| f(self)));
            if let Some(payload) = self.absorb(result) {
                escaped.get_or_insert(payload);
            }
        }
        escaped
    }

    fn halt(&self) -> ! {
        panic::resume_unwind(Box::new(Halt {
            test: self.id,
            name: self.name.clone(),
        }))
    }

    fn into_report(self) -> TestReport {
        let outcome = Outcome::from_flags(
            self.failed.load(Ordering::SeqCst),
            self.skipped.load(Ordering::SeqCst),
        );

        TestReport {
            name: self.name,
            outcome,
            logs: self.logs.into_inner().unwrap_or_else(PoisonError::into_inner),
            subtests: self
                .subtests
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl TestContext for LocalTest {
    fn name(&self) -> &str {
        &self.name
    }

    fn log(&self, message: &str) {
        self.push_log(message.to_string());
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    fn fail_now(&self) -> ! {
        self.fail();
        self.halt()
    }

    fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn helper(&self) {}

    fn cleanup(&self, f: Cleanup) {
        lock(&self.cleanups).push(f);
    }

    fn skip_now(&self) -> ! {
        self.skipped.store(true, Ordering::SeqCst);
        self.halt()
    }

    fn skipped(&self) -> bool {
        self.skipped.load(Ordering::SeqCst)
    }
}

/// Runs `body` as a local test and panics if it fails.
///
/// Bridges a local test into a `#[test]` function; the panic message carries
/// the captured log.
pub fn run_test<F>(name: &str, body: F) -> TestReport
where
    F: FnOnce(&LocalTest),
{
    let report = LocalTest::run(name, body);
    if !report.passed() {
        panic!("test {} failed:\n{}", report.name, report.logs.join("\n"));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn plain_body_passes() {
        let report = LocalTest::run("plain", |t| t.log("hello"));
        assert_eq!(report.outcome, Outcome::Passed);
        assert_eq!(report.logs, vec!["hello".to_string()]);
    }

    #[test]
    fn error_fails_and_continues() {
        let report = LocalTest::run("error", |t| {
            t.error("first");
            t.log("second");
        });

        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(report.logs, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn fatal_stops_body() {
        let report = LocalTest::run("fatal", |t| {
            if !t.failed() {
                t.fatal("stop");
            }
            t.log("not reached");
        });

        assert_eq!(report.outcome, Outcome::Failed);
        assert!(!report.logs_contain("not reached"));
    }

    #[test]
    fn skip_after_error_stays_failed() {
        let report = LocalTest::run("error-skip", |t| {
            t.error("Error");
            t.skip_now();
        });

        assert_eq!(report.outcome, Outcome::Failed);
    }

    #[test]
    fn skip_is_not_failure() {
        let report = LocalTest::run("skip", |t| t.skipf(format_args!("skipping {}", 1)));
        assert_eq!(report.outcome, Outcome::Skipped);
        assert!(report.logs_contain("skipping 1"));
    }

    #[test]
    fn panic_is_failure() {
        let report = LocalTest::run("panic", |_| panic!("kaboom"));
        assert_eq!(report.outcome, Outcome::Failed);
        assert!(report.logs_contain("kaboom"));
    }

    #[test]
    fn cleanups_run_in_reverse_order() {
        let report = LocalTest::run("order", |t| {
            t.cleanup(Box::new(|t: &dyn TestContext| t.log("first registered")));
            t.cleanup(Box::new(|t: &dyn TestContext| t.log("second registered")));
        });

        assert_eq!(
            report.logs,
            vec!["second registered".to_string(), "first registered".to_string()]
        );
    }

    #[test]
    fn cleanups_run_after_fatal_and_each_other() {
        let ran = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&ran), Arc::clone(&ran));

        let report = LocalTest::run("cleanup-fatal", move |t| {
            t.cleanup(Box::new(move |_: &dyn TestContext| {
                a.fetch_add(1, Ordering::SeqCst);
            }));
            t.cleanup(Box::new(move |t: &dyn TestContext| {
                b.fetch_add(1, Ordering::SeqCst);
                t.fatal("cleanup failed");
            }));
            t.fail_now();
        });

        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(report.outcome, Outcome::Failed);
    }

    #[test]
    fn cleanup_panic_escapes_after_remaining_cleanups() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&ran);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            LocalTest::run("cleanup-panic", move |t| {
                t.cleanup(Box::new(move |_: &dyn TestContext| {
                    counted.fetch_add(1, Ordering::SeqCst);
                }));
                t.cleanup(Box::new(|_: &dyn TestContext| panic!("counter broke")));
            })
        }));

        assert!(result.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_aimed_at_parent_fails_subtest_and_parent() {
        let report = LocalTest::run("outer", |parent| {
            parent.run_subtest("inner", |_| parent.skip_now());
            parent.log("outer continued");
        });

        let inner = report.find("outer/inner").expect("inner report");
        assert_eq!(inner.outcome, Outcome::Failed);
        assert!(inner.logs_contain("test outer was stopped from test outer/inner"));
        assert_eq!(report.outcome, Outcome::Failed);
        assert!(report.logs_contain("outer continued"));
    }

    #[test]
    fn cleanup_can_register_cleanup() {
        let report = LocalTest::run("nested-cleanup", |t| {
            t.cleanup(Box::new(|t: &dyn TestContext| {
                t.cleanup(Box::new(|t: &dyn TestContext| t.log("late")));
            }));
        });

        assert!(report.logs_contain("late"));
    }

    #[test]
    fn failed_subtest_fails_parent() {
        let report = LocalTest::run("parent", |t| {
            assert!(t.run_subtest("ok", |_| {}));
            assert!(!t.run_subtest("bad", |t| t.fail()));
        });

        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(report.subtests.len(), 2);
        assert_eq!(
            report.find("parent/bad").map(|r| r.outcome),
            Some(Outcome::Failed)
        );
    }

    #[test]
    fn parallel_subtests_all_complete() {
        let report = LocalTest::run("par", |t| {
            let cases = (0..8).map(|i| {
                (format!("case-{i}"), move |t: &LocalTest| t.logf(format_args!("case {i}")))
            });
            assert!(t.run_parallel(cases));
        });

        assert_eq!(report.outcome, Outcome::Passed);
        assert_eq!(report.subtests.len(), 8);
    }

    #[test]
    #[should_panic(expected = "test bridge failed")]
    fn run_test_panics_on_failure() {
        run_test("bridge", |t| t.error("test bridge failed"));
    }
}
