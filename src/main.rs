//! Verdict Orchestrator server
//!
//! Loads configuration, wires backends, checker and ledger together, and
//! serves the HTTP surface until interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use verdict_orchestrator::config::OrchestratorConfig;
use verdict_orchestrator::ledger::InMemoryLedger;
use verdict_orchestrator::orchestrator::{Orchestrator, RetryingInvoker};
use verdict_orchestrator::server::{run_server, AppState};
use verdict_orchestrator::utils::telemetry::init_telemetry;
use verdict_orchestrator::validation::ContractChecker;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = OrchestratorConfig::from_env().context("Failed to load configuration")?;
    let _telemetry = init_telemetry("verdict_orchestrator", config.log_dir.as_deref())?;

    info!(
        "Starting with {} backends, max {} attempts each",
        config.backends.len(),
        config.max_attempts
    );

    let registry = config.build_registry()?;
    let checker = Arc::new(ContractChecker::new(&config.checker)?);
    let ledger = Arc::new(InMemoryLedger::new(config.ledger.initial_credits, config.ledger.cost));

    let invoker = RetryingInvoker::new(checker, config.max_attempts);
    let orchestrator = Orchestrator::new(registry, invoker, ledger);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        max_input_chars: config.max_input_chars,
    };

    run_server(state, &config.bind_addr).await
}
