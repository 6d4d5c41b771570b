//! Expected-failure adapter.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{self, XFailConfig};
use crate::context::{Cleanup, TestContext};
use crate::error::Error;

/// Number of tests that failed as expected in this process.
static FAILED: AtomicU64 = AtomicU64::new(0);

/// Returns the number of tests that failed as expected.
///
/// The count is read at the time of the call; making sure that all relevant
/// tests finished is up to the caller.
pub fn failed_count() -> u64 {
    FAILED.load(Ordering::SeqCst)
}

fn record_expected_failure() -> u64 {
    increment(&FAILED)
}

/// Increments `counter`, panicking if it would leave the `u64` range.
fn increment(counter: &AtomicU64) -> u64 {
    match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1)) {
        Ok(previous) => previous + 1,
        Err(_) => panic!("{}", Error::CounterOverflow(u64::MAX)),
    }
}

/// Wraps `tb` in a context that expects the test to fail for `reason`.
///
/// At the end of the test, if it was marked as failed with the non-fatal
/// methods [`fail`](TestContext::fail), [`error`](TestContext::error) or
/// [`errorf`](TestContext::errorf), it passes instead. If it was not marked
/// as failed, it fails so that the `xfail` call can be removed. The fatal
/// methods [`fail_now`](TestContext::fail_now), [`fatal`](TestContext::fatal)
/// and [`fatalf`](TestContext::fatalf) skip the rest of the test instead.
///
/// An empty `reason` fails the test immediately.
///
/// # Panics
///
/// The completion check panics if more than `u64::MAX` tests failed as expected.
pub fn xfail<'a, T>(tb: &'a T, reason: &str) -> XFail<'a, T>
where
    T: TestContext + ?Sized,
{
    XFail::with_config(tb, reason, config::get_config())
}

/// A [`TestContext`] with expected-failure logic.
///
/// The wrapped context is never told about failures; the adapter tracks them
/// itself and settles the outcome in a cleanup registered on construction.
pub struct XFail<'a, T: TestContext + ?Sized> {
    tb: &'a T,
    // the wrapped context's own failed state must stay untouched
    failed: Arc<AtomicBool>,
    reason: Arc<str>,
    bypass: bool,
}

impl<'a, T: TestContext + ?Sized> XFail<'a, T> {
    /// Creates an adapter with an explicit configuration.
    pub fn with_config(tb: &'a T, reason: &str, config: &XFailConfig) -> Self {
        tb.helper();

        if reason.is_empty() {
            tb.fatal(&Error::EmptyReason.to_string());
        }

        let failed = Arc::new(AtomicBool::new(false));
        let reason: Arc<str> = Arc::from(reason);

        if config.bypass {
            tracing::debug!(test = tb.name(), reason = %reason, "xfail bypassed");
        } else {
            // an adapter underneath rebinds the check onto itself
            tb.cleanup(settle(Arc::clone(&failed), Arc::clone(&reason)));
        }

        Self {
            tb,
            failed,
            reason,
            bypass: config.bypass,
        }
    }

    /// Returns the reason the test is expected to fail.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the wrapped context.
    pub fn inner(&self) -> &'a T {
        self.tb
    }
}

/// Builds the completion check run once the test is over.
fn settle(failed: Arc<AtomicBool>, reason: Arc<str>) -> Cleanup {
    Box::new(move |tb: &dyn TestContext| {
        if failed.load(Ordering::SeqCst) {
            tb.logf(format_args!("Test failed as expected: {reason}"));
            let count = record_expected_failure();
            tracing::info!(test = tb.name(), reason = %reason, count, "expected failure recorded");
            return;
        }

        tracing::warn!(test = tb.name(), reason = %reason, "test passed unexpectedly");
        tb.fatalf(format_args!("Test passed unexpectedly: {reason}"));
    })
}

impl<T: TestContext + ?Sized> TestContext for XFail<'_, T> {
    fn name(&self) -> &str {
        self.tb.name()
    }

    fn log(&self, message: &str) {
        self.tb.log(message);
    }

    fn logf(&self, args: fmt::Arguments<'_>) {
        self.tb.logf(args);
    }

    /// Equivalent to [`log`](TestContext::log) followed by [`fail`](TestContext::fail).
    fn error(&self, message: &str) {
        self.log(message);
        self.fail();
    }

    /// Equivalent to [`logf`](TestContext::logf) followed by [`fail`](TestContext::fail).
    fn errorf(&self, args: fmt::Arguments<'_>) {
        self.logf(args);
        self.fail();
    }

    /// Marks the test as failed but continues execution.
    fn fail(&self) {
        if self.bypass {
            self.tb.fail();
            return;
        }

        tracing::debug!(test = self.tb.name(), reason = %self.reason, "failure intercepted");
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Marks the test as failed and skips the rest of it.
    fn fail_now(&self) -> ! {
        if self.bypass {
            self.tb.fail_now();
        }

        self.fail();

        // unwinding past the host would bypass the completion check
        self.tb.skip_now()
    }

    fn fatal(&self, message: &str) -> ! {
        self.log(message);
        self.fail_now()
    }

    fn fatalf(&self, args: fmt::Arguments<'_>) -> ! {
        self.logf(args);
        self.fail_now()
    }

    /// Reports whether the test was marked as failed through this adapter.
    fn failed(&self) -> bool {
        if self.bypass {
            return self.tb.failed();
        }

        self.failed.load(Ordering::SeqCst)
    }

    fn helper(&self) {
        self.tb.helper();
    }

    /// Registers `f` with the wrapped context.
    ///
    /// When it runs, `f` sees this adapter rebound onto the context the host
    /// hands out, so failures it reports are intercepted like the body's.
    fn cleanup(&self, f: Cleanup) {
        let failed = Arc::clone(&self.failed);
        let reason = Arc::clone(&self.reason);
        let bypass = self.bypass;

        self.tb.cleanup(Box::new(move |host: &dyn TestContext| {
            let view = XFail {
                tb: host,
                failed,
                reason,
                bypass,
            };
            f(&view);
        }));
    }

    fn skip(&self, message: &str) -> ! {
        self.tb.skip(message)
    }

    fn skipf(&self, args: fmt::Arguments<'_>) -> ! {
        self.tb.skipf(args)
    }

    fn skip_now(&self) -> ! {
        self.tb.skip_now()
    }

    fn skipped(&self) -> bool {
        self.tb.skipped()
    }
}

impl<T: TestContext + ?Sized> fmt::Debug for XFail<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XFail")
            .field("test", &self.tb.name())
            .field("reason", &self.reason)
            .field("failed", &self.failed.load(Ordering::SeqCst))
            .field("bypass", &self.bypass)
            .finish()
    }
}
