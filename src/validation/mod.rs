//! Acceptability Contract
//!
//! Pure validation of backend results. A failed check never raises; it
//! produces the list of violated constraints that feeds the next retry.

mod checker;

pub use checker::{CheckerConfig, ContractChecker, TierRule};

use crate::analysis::AnalysisResult;

/// Outcome of checking one result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub valid: bool,
    pub violations: Vec<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
        }
    }

    pub fn add_violation(&mut self, violation: impl Into<String>) {
        self.valid = false;
        self.violations.push(violation.into());
    }

    /// Feedback text handed to the next attempt.
    pub fn feedback(&self) -> String {
        self.violations.join("; ")
    }
}

/// Must be total and deterministic for a given result.
pub trait AcceptabilityChecker: Send + Sync {
    fn check(&self, result: &AnalysisResult) -> Verdict;
}
