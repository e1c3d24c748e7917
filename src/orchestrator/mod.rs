//! Orchestrator Module
//!
//! Admission, concurrent dispatch to every registered backend, and the single
//! post-join debit. Two delivery modes share the same dispatch core:
//! blocking ([`Orchestrator::analyze`]) and streaming
//! ([`Orchestrator::analyze_streaming`]).

pub mod aggregation;
mod dispatch;
pub mod invoker;
pub mod stream;

pub use aggregation::{run_all, AggregateOutcome};
pub use dispatch::BackendOutcome;
pub use invoker::{AttemptStatus, Invocation, RetryingInvoker, DEFAULT_MAX_ATTEMPTS};
pub use stream::{AnalysisStream, StreamEvent};

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::analysis::AnalysisInput;
use crate::backend::{BackendError, BackendId, BackendRegistry};
use crate::ledger::{Ledger, LedgerDelta, LedgerError, Usage};
use crate::utils::preview;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrchestratorError {
    #[error("insufficient credits for account {account}")]
    AdmissionDenied { account: String },
    #[error("admission check failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("all backends failed")]
    TotalFailure { failures: Vec<(BackendId, BackendError)> },
}

/// Blocking-mode response
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub outcome: AggregateOutcome,
    /// `None` when the debit itself failed
    pub credits: Option<LedgerDelta>,
}

pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    invoker: Arc<RetryingInvoker>,
    ledger: Arc<dyn Ledger>,
}

impl Orchestrator {
    pub fn new(registry: BackendRegistry, invoker: RetryingInvoker, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            registry: Arc::new(registry),
            invoker: Arc::new(invoker),
            ledger,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn max_attempts(&self) -> usize {
        self.invoker.max_attempts()
    }

    /// Blocking mode: every backend reaches a terminal state before returning.
    pub async fn analyze(&self, account: &str, input: AnalysisInput) -> Result<Analysis, OrchestratorError> {
        let span = info_span!("analysis", request_id = %uuid::Uuid::new_v4(), kind = %input.kind(), mode = "blocking");
        async move {
            info!("Analysing {}", preview(input.text(), 80));
            let estimate = Usage::estimate(input.char_count(), self.registry.len());
            Self::admit(self.ledger.as_ref(), account, &estimate).await?;

            let result = run_all(&self.registry, self.invoker.clone(), &input).await;
            let succeeded = result.as_ref().map(AggregateOutcome::success_count).unwrap_or(0);
            let usage = Usage { input_chars: input.char_count(), dispatched: self.registry.len(), succeeded };
            let credits = Self::settle(self.ledger.as_ref(), account, &usage).await;

            result.map(|outcome| Analysis { outcome, credits })
        }
        .instrument(span)
        .await
    }

    /// Streaming mode: events arrive in completion order and end with `Done`.
    ///
    /// Must be called inside a Tokio runtime. Dropping the returned stream
    /// aborts the request; nothing is debited for aborted work.
    pub fn analyze_streaming(&self, account: &str, input: AnalysisInput) -> AnalysisStream {
        let span = info_span!("analysis", request_id = %uuid::Uuid::new_v4(), kind = %input.kind(), mode = "streaming");
        let _enter = span.enter();
        info!("Analysing {}", preview(input.text(), 80));
        stream::spawn(self, account.to_string(), input)
    }

    async fn admit(ledger: &dyn Ledger, account: &str, estimate: &Usage) -> Result<(), OrchestratorError> {
        match ledger.reserve(account, estimate).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!("Admission denied for account {}", account);
                Err(OrchestratorError::AdmissionDenied { account: account.to_string() })
            }
            Err(e) => {
                warn!("Ledger reserve failed for account {}: {}", account, e);
                Err(OrchestratorError::Ledger(e))
            }
        }
    }

    /// Best effort; a failed debit is logged and never blocks the response.
    async fn settle(ledger: &dyn Ledger, account: &str, usage: &Usage) -> Option<LedgerDelta> {
        match ledger.debit(account, usage).await {
            Ok(delta) => {
                info!("Debited {} credits from {} (balance {})", delta.charged, account, delta.balance);
                Some(delta)
            }
            Err(e) => {
                warn!("Ledger debit failed for account {} ({:?}): {}", account, usage, e);
                None
            }
        }
    }
}
