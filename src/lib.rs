//! xfail - expected-failure adapter for test contexts
//!
//! Wrapping a test context with [`xfail`] marks the test as expected to fail:
//! non-fatal failures turn into a pass at the end of the test, fatal ones skip
//! the rest of it, and a test that passes anyway fails so the marker can be
//! removed.
//!
//! ```
//! use xfail::{run_test, xfail, TestContext};
//!
//! run_test("parse_duration", |tt| {
//!     let t = xfail(tt, "exponent notation is not supported yet");
//!     if "3.336e-6".parse::<u64>().is_err() {
//!         t.error("cannot parse exponent");
//!     }
//! });
//! ```

pub mod adapter;
pub mod config;
pub mod context;
pub mod error;
pub mod host;

pub use adapter::{failed_count, xfail, XFail};
pub use config::XFailConfig;
pub use context::{Cleanup, TestContext};
pub use error::{Error, Result};
pub use host::{run_test, LocalTest, Outcome, TestReport};
