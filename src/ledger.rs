//! Credit Ledger Hook
//!
//! Admission control before dispatch and a single debit after the fan-out
//! joins. The orchestrator only reports counts; pricing is the ledger's call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tokio::sync::Mutex;

/// What one request consumed (or, at reserve time, may consume)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_chars: usize,
    pub dispatched: usize,
    pub succeeded: usize,
}

impl Usage {
    /// Upper bound used for admission: assume every backend succeeds.
    pub fn estimate(input_chars: usize, dispatched: usize) -> Self {
        Self { input_chars, dispatched, succeeded: dispatched }
    }
}

/// Balance after a debit. Sent to callers as `updatedCredits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub balance: u64,
    pub charged: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("unknown account: {0}")]
    UnknownAccount(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// `Ok(false)` means admission denied.
    async fn reserve(&self, account: &str, usage: &Usage) -> Result<bool, LedgerError>;

    async fn debit(&self, account: &str, usage: &Usage) -> Result<LedgerDelta, LedgerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostPolicy {
    pub per_backend: u64,
    pub per_thousand_chars: u64,
}

impl Default for CostPolicy {
    fn default() -> Self {
        Self { per_backend: 1, per_thousand_chars: 0 }
    }
}

impl CostPolicy {
    pub fn cost(&self, usage: &Usage) -> u64 {
        let kchars = usage.input_chars.div_ceil(1000) as u64;
        self.per_backend * usage.succeeded as u64 + self.per_thousand_chars * kchars
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitRecord {
    pub account: String,
    pub usage: Usage,
    pub charged: u64,
    pub balance: u64,
    pub at: DateTime<Utc>,
}

const JOURNAL_CAPACITY: usize = 1024;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, u64>,
    journal: VecDeque<DebitRecord>,
}

/// Process-local ledger; accounts are opened lazily with `initial_credits`.
pub struct InMemoryLedger {
    initial_credits: u64,
    policy: CostPolicy,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(initial_credits: u64, policy: CostPolicy) -> Self {
        Self {
            initial_credits,
            policy,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub async fn balance(&self, account: &str) -> u64 {
        let state = self.state.lock().await;
        state.balances.get(account).copied().unwrap_or(self.initial_credits)
    }

    pub async fn journal(&self) -> Vec<DebitRecord> {
        self.state.lock().await.journal.iter().cloned().collect()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn reserve(&self, account: &str, usage: &Usage) -> Result<bool, LedgerError> {
        let balance = self.balance(account).await;
        Ok(balance >= self.policy.cost(usage))
    }

    async fn debit(&self, account: &str, usage: &Usage) -> Result<LedgerDelta, LedgerError> {
        let cost = self.policy.cost(usage);
        let mut state = self.state.lock().await;
        let balance = state.balances.entry(account.to_string()).or_insert(self.initial_credits);
        let charged = cost.min(*balance);
        *balance -= charged;
        let delta = LedgerDelta { balance: *balance, charged };

        if state.journal.len() == JOURNAL_CAPACITY {
            state.journal.pop_front();
        }
        state.journal.push_back(DebitRecord {
            account: account.to_string(),
            usage: *usage,
            charged,
            balance: delta.balance,
            at: Utc::now(),
        });

        Ok(delta)
    }
}
