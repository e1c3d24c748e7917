//! Fan-Out/Fan-In Aggregation
//!
//! Blocking mode: run every backend, wait for all of them, and fold the
//! reports into one map keyed by backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::dispatch::{BackendOutcome, Dispatch};
use super::invoker::{Invocation, RetryingInvoker};
use super::OrchestratorError;
use crate::analysis::AnalysisInput;
use crate::backend::{BackendError, BackendId, BackendRegistry};

/// One entry per dispatched backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    entries: BTreeMap<BackendId, BackendOutcome>,
}

impl AggregateOutcome {
    pub fn get(&self, id: BackendId) -> Option<&BackendOutcome> {
        self.entries.get(&id)
    }

    pub fn backends(&self) -> Vec<BackendId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BackendId, &BackendOutcome)> {
        self.entries.iter().map(|(id, o)| (*id, o))
    }

    pub fn successes(&self) -> impl Iterator<Item = (BackendId, &Invocation)> {
        self.entries.iter().filter_map(|(id, o)| match o {
            BackendOutcome::Completed(inv) => Some((*id, inv)),
            BackendOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (BackendId, &BackendError)> {
        self.entries.iter().filter_map(|(id, o)| match o {
            BackendOutcome::Failed(e) => Some((*id, e)),
            BackendOutcome::Completed(_) => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }
}

/// Runs all backends to a terminal state.
///
/// Fails with [`OrchestratorError::TotalFailure`] when no backend produced a
/// result; a partial map is a success.
pub async fn run_all(
    registry: &BackendRegistry,
    invoker: Arc<RetryingInvoker>,
    input: &AnalysisInput,
) -> Result<AggregateOutcome, OrchestratorError> {
    let mut dispatch = Dispatch::start(registry, invoker, input);
    let mut entries = BTreeMap::new();

    while let Some(report) = dispatch.next().await {
        entries.insert(report.backend, report.outcome);
    }

    let outcome = AggregateOutcome { entries };
    let succeeded = outcome.success_count();
    info!("Fan-in complete: {}/{} backends produced a result", succeeded, dispatch.dispatched());

    if succeeded == 0 {
        let failures = outcome.failures().map(|(id, e)| (id, e.clone())).collect();
        return Err(OrchestratorError::TotalFailure { failures });
    }

    Ok(outcome)
}
