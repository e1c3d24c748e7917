//! Architecture Verification Suite
//!
//! Everything shared across worker tasks must stay thread-safe, and the
//! public alias table must never drift.

#[cfg(test)]
mod architecture_tests {
    use verdict_orchestrator::backend::{BackendId, ALIAS_TABLE};

    // Shared across every spawned worker and the stream driver
    #[test]
    fn test_shared_components_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}

        assert_send_sync::<verdict_orchestrator::orchestrator::Orchestrator>();
        assert_send_sync::<verdict_orchestrator::orchestrator::RetryingInvoker>();
        assert_send_sync::<verdict_orchestrator::backend::BackendRegistry>();
        assert_send_sync::<verdict_orchestrator::backend::LlmBackend>();
        assert_send_sync::<verdict_orchestrator::ledger::InMemoryLedger>();
        assert_send_sync::<verdict_orchestrator::validation::ContractChecker>();
        assert_send_sync::<dyn verdict_orchestrator::backend::AnalysisBackend>();
        assert_send_sync::<dyn verdict_orchestrator::ledger::Ledger>();
    }

    // Handed to the HTTP layer as a response body
    #[test]
    fn test_stream_is_send() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<verdict_orchestrator::orchestrator::AnalysisStream>();
    }

    // Clients key on these strings
    #[test]
    fn test_alias_table_is_stable() {
        let aliases: Vec<_> = ALIAS_TABLE.iter().map(|(_, a)| *a).collect();
        assert_eq!(aliases, vec!["provider-1", "provider-2", "provider-3", "provider-4"]);

        for (id, alias) in ALIAS_TABLE {
            assert_eq!(id.alias(), alias);
            assert_eq!(BackendId::from_alias(alias), Some(id));
        }
        assert_eq!(BackendId::from_alias("A"), None);
    }
}
