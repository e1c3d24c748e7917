//! Retrying Invoker
//!
//! Wraps one backend with the acceptability checker: request, validate, and
//! on rejection retry with the violations appended as feedback, up to a fixed
//! number of attempts.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisInput, AnalysisResult};
use crate::backend::{AnalysisBackend, BackendError};
use crate::validation::AcceptabilityChecker;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// Passed the checker
    Accepted,
    /// Still invalid after the last allowed attempt; returned anyway
    Exhausted,
}

/// Terminal state of one backend's retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub result: AnalysisResult,
    pub attempts: usize,
    pub status: AttemptStatus,
    /// Violations of the returned result. Empty when accepted.
    pub violations: Vec<String>,
}

impl Invocation {
    pub fn is_degraded(&self) -> bool {
        self.status == AttemptStatus::Exhausted
    }
}

/// Per-backend loop state. Lives only for one `invoke` call.
#[derive(Debug, Default)]
struct AttemptState {
    attempts: usize,
    feedback: Option<String>,
}

pub struct RetryingInvoker {
    checker: Arc<dyn AcceptabilityChecker>,
    max_attempts: usize,
}

impl RetryingInvoker {
    /// `max_attempts` below 1 is raised to 1.
    pub fn new(checker: Arc<dyn AcceptabilityChecker>, max_attempts: usize) -> Self {
        Self {
            checker,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Transport errors are returned immediately; only acceptability
    /// failures are retried.
    pub async fn invoke(&self, input: &AnalysisInput, backend: &dyn AnalysisBackend) -> Result<Invocation, BackendError> {
        let mut state = AttemptState::default();

        loop {
            state.attempts += 1;
            let result = backend.analyze(input, state.feedback.as_deref()).await?;
            let verdict = self.checker.check(&result);

            if verdict.valid {
                info!("Backend {} accepted on attempt {}", backend.id(), state.attempts);
                return Ok(Invocation {
                    result,
                    attempts: state.attempts,
                    status: AttemptStatus::Accepted,
                    violations: Vec::new(),
                });
            }

            if state.attempts >= self.max_attempts {
                warn!(
                    "Backend {} exhausted {} attempts; keeping result with violations: {}",
                    backend.id(),
                    state.attempts,
                    verdict.feedback()
                );
                return Ok(Invocation {
                    result,
                    attempts: state.attempts,
                    status: AttemptStatus::Exhausted,
                    violations: verdict.violations,
                });
            }

            debug!("Backend {} attempt {} rejected: {}", backend.id(), state.attempts, verdict.feedback());
            state.feedback = Some(verdict.feedback());
        }
    }
}
