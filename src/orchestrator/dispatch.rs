//! Worker fan-out shared by the blocking and streaming paths.
//!
//! Each backend runs in its own task and reports its terminal state over a
//! channel to the single owner of the `Dispatch`. Dropping the `Dispatch`
//! aborts every worker that is still running.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info_span, Instrument};

use super::invoker::{Invocation, RetryingInvoker};
use crate::analysis::AnalysisInput;
use crate::backend::{BackendError, BackendId, BackendRegistry};

/// How one backend ended
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome {
    Completed(Invocation),
    Failed(BackendError),
}

impl BackendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BackendOutcome::Completed(_))
    }
}

#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub backend: BackendId,
    pub outcome: BackendOutcome,
}

pub(crate) struct Dispatch {
    // Held only so that dropping the dispatch aborts the workers.
    _workers: JoinSet<()>,
    reports: mpsc::Receiver<WorkerReport>,
    pending: BTreeSet<BackendId>,
    dispatched: usize,
}

impl Dispatch {
    pub fn start(registry: &BackendRegistry, invoker: Arc<RetryingInvoker>, input: &AnalysisInput) -> Self {
        let (tx, reports) = mpsc::channel(registry.len().max(1));
        let mut workers = JoinSet::new();
        let mut pending = BTreeSet::new();

        for (id, backend) in registry.iter() {
            pending.insert(id);
            let tx = tx.clone();
            let backend = backend.clone();
            let invoker = invoker.clone();
            let input = input.clone();

            workers.spawn(
                async move {
                    let outcome = match invoker.invoke(&input, backend.as_ref()).await {
                        Ok(invocation) => BackendOutcome::Completed(invocation),
                        Err(e) => {
                            tracing::warn!("Backend {} failed: {}", id, e);
                            BackendOutcome::Failed(e)
                        }
                    };
                    let _ = tx.send(WorkerReport { backend: id, outcome }).await;
                }
                .instrument(info_span!("backend", id = %id, alias = id.alias())),
            );
        }

        let dispatched = pending.len();
        Self { _workers: workers, reports, pending, dispatched }
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Next terminal report in completion order, `None` once every
    /// dispatched backend has reported.
    pub async fn next(&mut self) -> Option<WorkerReport> {
        if self.pending.is_empty() {
            return None;
        }

        match self.reports.recv().await {
            Some(report) => {
                self.pending.remove(&report.backend);
                Some(report)
            }
            // Every sender is gone, so whoever is still pending died without reporting.
            None => {
                let backend = self.pending.pop_first()?;
                Some(WorkerReport {
                    backend,
                    outcome: BackendOutcome::Failed(BackendError::Crashed("worker exited without reporting".to_string())),
                })
            }
        }
    }
}
