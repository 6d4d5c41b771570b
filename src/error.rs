//! Error types for the xfail crate.

use thiserror::Error;

/// Top-level error type.
///
/// Most conditions in this crate are reported through the test context's
/// fatal path rather than returned; the variants double as their messages.
#[derive(Error, Debug)]
pub enum Error {
    /// An expected failure was declared without a reason.
    #[error("XFail reason can't be empty")]
    EmptyReason,

    /// The process-wide expected-failure counter cannot be incremented further.
    #[error("the number of failed tests exceeded the max u64 range ({0})")]
    CounterOverflow(u64),

    /// A test report could not be serialized.
    #[error("failed to serialize test report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type alias for xfail operations.
pub type Result<T> = std::result::Result<T, Error>;
