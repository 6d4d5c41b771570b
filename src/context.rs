//! The test-context capability set.
//!
//! [`TestContext`] is the contract between a test body and whatever host runs
//! it: logging, failure marking, skipping and scoped cleanup. Both the hosts
//! and the [`XFail`](crate::XFail) adapter implement it, so an adapter can be
//! passed anywhere a context is expected.

use std::fmt;

/// Callback registered with [`TestContext::cleanup`].
///
/// The host passes itself to the callback when it runs, so the callback can
/// report through the context without borrowing it.
pub type Cleanup = Box<dyn FnOnce(&dyn TestContext) + Send + 'static>;

/// Capability set of a running test.
///
/// Methods returning `!` transfer control out of the current test body and
/// must be called from the thread running that body.
pub trait TestContext: Send + Sync {
    /// Returns the name of the running test.
    fn name(&self) -> &str;

    /// Records a log line for the test.
    fn log(&self, message: &str);

    /// Formats its arguments and records them as a log line.
    fn logf(&self, args: fmt::Arguments<'_>) {
        self.log(&args.to_string());
    }

    /// Equivalent to [`log`](Self::log) followed by [`fail`](Self::fail).
    fn error(&self, message: &str) {
        self.log(message);
        self.fail();
    }

    /// Equivalent to [`logf`](Self::logf) followed by [`fail`](Self::fail).
    fn errorf(&self, args: fmt::Arguments<'_>) {
        self.logf(args);
        self.fail();
    }

    /// Marks the test as failed but continues execution.
    fn fail(&self);

    /// Marks the test as failed and stops its execution.
    fn fail_now(&self) -> !;

    /// Equivalent to [`log`](Self::log) followed by [`fail_now`](Self::fail_now).
    fn fatal(&self, message: &str) -> ! {
        self.log(message);
        self.fail_now()
    }

    /// Equivalent to [`logf`](Self::logf) followed by [`fail_now`](Self::fail_now).
    fn fatalf(&self, args: fmt::Arguments<'_>) -> ! {
        self.logf(args);
        self.fail_now()
    }

    /// Reports whether the test has failed.
    fn failed(&self) -> bool;

    /// Marks the calling function as a test helper.
    fn helper(&self);

    /// Registers a callback to run after the test and all its sub-tests complete.
    ///
    /// Callbacks run in last-registered, first-run order.
    fn cleanup(&self, f: Cleanup);

    /// Equivalent to [`log`](Self::log) followed by [`skip_now`](Self::skip_now).
    fn skip(&self, message: &str) -> ! {
        self.log(message);
        self.skip_now()
    }

    /// Equivalent to [`logf`](Self::logf) followed by [`skip_now`](Self::skip_now).
    fn skipf(&self, args: fmt::Arguments<'_>) -> ! {
        self.logf(args);
        self.skip_now()
    }

    /// Marks the test as skipped and stops its execution.
    ///
    /// Skipping does not clear an earlier failure.
    fn skip_now(&self) -> !;

    /// Reports whether the test was skipped.
    fn skipped(&self) -> bool;
}
