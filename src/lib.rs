//! Verdict Orchestrator
//!
//! Fans one analysis request out to several independent backends:
//! - Per-backend validation and feedback-driven retries
//! - Partial-failure aggregation (blocking) or completion-order streaming
//! - Admission check and a single post-join ledger debit
//! - Stable public aliases for internal backend identifiers

pub mod analysis;
pub mod backend;
pub mod config;
pub mod ledger;
pub mod orchestrator;
pub mod protocol;
pub mod server;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use analysis::{AnalysisInput, AnalysisKind, AnalysisResult};
pub use backend::{AnalysisBackend, BackendError, BackendId, BackendRegistry};
pub use config::OrchestratorConfig;
pub use ledger::{InMemoryLedger, Ledger, LedgerDelta};
pub use orchestrator::{Orchestrator, OrchestratorError, StreamEvent};
pub use validation::{AcceptabilityChecker, ContractChecker};
