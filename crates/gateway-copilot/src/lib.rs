pub mod agent;
pub mod parsing;
pub mod stage;

pub use agent::{CopilotAgent, CopilotTurnOutcome, DEFAULT_MAX_TURNS};
pub use parsing::{parse_agent_step, AgentStep};
pub use stage::{config_for, StageConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gateway_config::AppConfig;
    use gateway_ledger::CreditLedger;
    use gateway_orchestrator::CompanyIntelLoader;
    use gateway_prompts::PromptRegistry;
    use gateway_providers::ProviderRegistry;
    use gateway_store::{collections, DocumentStore, InMemoryStore, TypedStore};
    use gateway_tools::ToolRegistry;
    use gateway_types::{Caller, CopilotStage, Job};

    fn invoker(store: Arc<dyn DocumentStore>) -> Arc<gateway_orchestrator::ProviderInvoker> {
        let config = Arc::new(AppConfig::from_env().expect("config"));
        let providers = Arc::new(ProviderRegistry::from_env());
        let prompts = Arc::new(PromptRegistry::bootstrap());
        let ledger = Arc::new(CreditLedger::new(store, config.clone()));
        Arc::new(gateway_orchestrator::ProviderInvoker::new(providers, prompts, ledger, config))
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store: Arc<dyn DocumentStore> = InMemoryStore::new();
        let agent = CopilotAgent::new(
            store.clone(),
            invoker(store.clone()),
            ToolRegistry::new(),
            Arc::new(CompanyIntelLoader::new(store)),
        );
        let caller = Caller { user_id: "u1".to_string(), correlation_id: "c1".to_string() };
        let err = agent
            .handle_turn("missing", CopilotStage::Wizard, "hi".to_string(), &caller)
            .await
            .unwrap_err();
        assert_eq!(err.kind, gateway_types::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn non_owner_is_forbidden() {
        let store: Arc<dyn DocumentStore> = InMemoryStore::new();
        let job = Job::new("j1", "owner", chrono::Utc::now());
        store.save(collections::JOBS, "j1", &job).await.unwrap();
        let agent = CopilotAgent::new(
            store.clone(),
            invoker(store.clone()),
            ToolRegistry::new(),
            Arc::new(CompanyIntelLoader::new(store)),
        );
        let caller = Caller { user_id: "someone-else".to_string(), correlation_id: "c1".to_string() };
        let err = agent
            .handle_turn("j1", CopilotStage::Wizard, "hi".to_string(), &caller)
            .await
            .unwrap_err();
        assert_eq!(err.kind, gateway_types::ErrorKind::Forbidden);
    }
}
