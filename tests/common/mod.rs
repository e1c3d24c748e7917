//! Scripted backends shared by the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use verdict_orchestrator::analysis::{AnalysisInput, AnalysisKind, AnalysisResult};
use verdict_orchestrator::backend::{AnalysisBackend, BackendError, BackendId, BackendRegistry};
use verdict_orchestrator::ledger::{CostPolicy, InMemoryLedger, Ledger, LedgerDelta, LedgerError, Usage};
use verdict_orchestrator::orchestrator::{Orchestrator, RetryingInvoker, DEFAULT_MAX_ATTEMPTS};
use verdict_orchestrator::validation::{CheckerConfig, ContractChecker};

#[derive(Debug, Clone)]
pub enum Step {
    Reply(Value),
    Fail(BackendError),
}

/// Plays back its steps in order; the last step repeats.
pub struct ScriptedBackend {
    id: BackendId,
    steps: Mutex<VecDeque<Step>>,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub feedback: Arc<Mutex<Vec<Option<String>>>>,
    /// Set once a call has run to completion
    pub finished: Arc<AtomicBool>,
}

impl ScriptedBackend {
    pub fn new(id: BackendId, steps: Vec<Step>) -> Self {
        Self {
            id,
            steps: Mutex::new(steps.into()),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            feedback: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn valid(id: BackendId) -> Self {
        Self::new(id, vec![Step::Reply(valid_cognitive())])
    }

    pub fn failing(id: BackendId) -> Self {
        Self::new(id, vec![Step::Fail(BackendError::Transport("connection refused".to_string()))])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    async fn analyze(&self, input: &AnalysisInput, feedback: Option<&str>) -> Result<AnalysisResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.feedback.lock().await.push(feedback.map(str::to_string));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = {
            let mut steps = self.steps.lock().await;
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };

        self.finished.store(true, Ordering::SeqCst);
        match step {
            Some(Step::Reply(value)) => AnalysisResult::from_value(input.kind(), value)
                .ok_or_else(|| BackendError::Malformed("not an object".to_string())),
            Some(Step::Fail(e)) => Err(e),
            None => Err(BackendError::Transport("script exhausted".to_string())),
        }
    }
}

pub fn valid_cognitive() -> Value {
    json!({
        "score": 82,
        "tier": "high",
        "summary": "Structured, precise argumentation.",
        "reasoning": "Claims are supported and qualified."
    })
}

/// Declares a high tier its score cannot back.
pub fn invalid_cognitive() -> Value {
    json!({
        "score": 40,
        "tier": "high",
        "summary": "Mixed.",
        "reasoning": "Some support."
    })
}

pub fn cognitive_input() -> AnalysisInput {
    AnalysisInput::new("The committee reviewed the proposal in detail.", AnalysisKind::Cognitive).unwrap()
}

pub fn checker() -> Arc<ContractChecker> {
    Arc::new(ContractChecker::new(&CheckerConfig::default()).unwrap())
}

pub fn ledger(credits: u64) -> Arc<InMemoryLedger> {
    Arc::new(InMemoryLedger::new(credits, CostPolicy::default()))
}

pub fn registry(backends: Vec<ScriptedBackend>) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for backend in backends {
        registry.register_instance(backend);
    }
    registry
}

pub fn orchestrator(backends: Vec<ScriptedBackend>, ledger: Arc<dyn Ledger>) -> Orchestrator {
    Orchestrator::new(registry(backends), RetryingInvoker::new(checker(), DEFAULT_MAX_ATTEMPTS), ledger)
}

/// Ledger whose operations fail on demand.
pub struct FailingLedger {
    pub fail_reserve: bool,
    pub fail_debit: bool,
    pub debits: AtomicUsize,
}

impl FailingLedger {
    pub fn reserve_down() -> Arc<Self> {
        Arc::new(Self { fail_reserve: true, fail_debit: false, debits: AtomicUsize::new(0) })
    }

    pub fn debit_down() -> Arc<Self> {
        Arc::new(Self { fail_reserve: false, fail_debit: true, debits: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl Ledger for FailingLedger {
    async fn reserve(&self, _account: &str, _usage: &Usage) -> Result<bool, LedgerError> {
        if self.fail_reserve {
            return Err(LedgerError::Unavailable("billing store offline".to_string()));
        }
        Ok(true)
    }

    async fn debit(&self, _account: &str, _usage: &Usage) -> Result<LedgerDelta, LedgerError> {
        self.debits.fetch_add(1, Ordering::SeqCst);
        if self.fail_debit {
            return Err(LedgerError::Unavailable("billing store offline".to_string()));
        }
        Ok(LedgerDelta { balance: 0, charged: 0 })
    }
}
