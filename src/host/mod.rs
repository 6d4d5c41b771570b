//! Local host for running test bodies against a [`TestContext`](crate::TestContext).
//!
//! The built-in Rust harness hands no context to a test, so this module
//! provides a small in-process one: [`LocalTest`] records logs, failure and
//! skip state, runs cleanups and nests sub-tests. [`run_test`] bridges it
//! into ordinary `#[test]` functions.

mod local;
mod report;

pub use local::{run_test, LocalTest};
pub use report::{Outcome, TestReport};
