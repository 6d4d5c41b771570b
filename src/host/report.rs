//! Outcome reporting for local tests.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Final state of a finished test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

impl Outcome {
    /// Derives the outcome from the recorded flags; failure wins over skip.
    pub fn from_flags(failed: bool, skipped: bool) -> Self {
        if failed {
            Outcome::Failed
        } else if skipped {
            Outcome::Skipped
        } else {
            Outcome::Passed
        }
    }
}

/// Result of a finished local test and its sub-tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Full test name, sub-tests joined with `/`.
    pub name: String,
    /// Final outcome.
    pub outcome: Outcome,
    /// Log lines in the order they were recorded.
    pub logs: Vec<String>,
    /// Reports of sub-tests in completion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtests: Vec<TestReport>,
}

impl TestReport {
    /// Returns true unless the test failed. Skipped tests count as passed.
    pub fn passed(&self) -> bool {
        self.outcome != Outcome::Failed
    }

    /// Returns true if any log line of this test contains `needle`.
    pub fn logs_contain(&self, needle: &str) -> bool {
        self.logs.iter().any(|line| line.contains(needle))
    }

    /// Finds a test in this report tree by its full name.
    pub fn find(&self, name: &str) -> Option<&TestReport> {
        if self.name == name {
            return Some(self);
        }
        self.subtests.iter().find_map(|sub| sub.find(name))
    }

    /// Serializes the report tree as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
