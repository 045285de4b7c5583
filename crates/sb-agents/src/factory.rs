use crate::action::{ActionExecutor, DryRunExecutor};
use crate::casual::CasualAgent;
use crate::coder::{CoderAgent, FileAgent};
use crate::knowledge::{EmptyKnowledge, KnowledgeSource};
use crate::model::LanguageModel;
use crate::retrieval::RetrievalAgent;
use async_trait::async_trait;
use sb_core::SwitchboardConfig;
use sb_session::{AgentRegistry, MemoryCompressor, MemoryStore, SessionFactory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Builds the casual, coder, files and retrieval agents for every session.
pub struct StandardSessionFactory {
    config: Arc<SwitchboardConfig>,
    model: Arc<dyn LanguageModel>,
    knowledge: Arc<dyn KnowledgeSource>,
    executor: Arc<dyn ActionExecutor>,
    store: Option<Arc<dyn MemoryStore>>,
}

impl StandardSessionFactory {
    pub fn new(config: Arc<SwitchboardConfig>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            config,
            model,
            knowledge: Arc::new(EmptyKnowledge),
            executor: Arc::new(DryRunExecutor),
            store: None,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Store used to recover memories when `session.recover_last_session` is on.
    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn work_dir(&self) -> PathBuf {
        self.config
            .agents
            .work_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn compressor(&self) -> MemoryCompressor {
        MemoryCompressor::new().with_max_turns(self.config.agents.memory_max_turns)
    }

    pub fn registry(&self) -> AgentRegistry {
        let agents = &self.config.agents;
        let model = Arc::clone(&self.model);
        let executor = Arc::clone(&self.executor);

        AgentRegistry::new()
            .with_agent(
                CasualAgent::new(&agents.agent_name, Arc::clone(&model))
                    .with_languages(agents.languages.clone())
                    .with_compressor(self.compressor()),
            )
            .with_agent(
                CoderAgent::new(Arc::clone(&model), Arc::clone(&executor))
                    .with_max_iterations(agents.max_iterations)
                    .with_compressor(self.compressor()),
            )
            .with_agent(
                FileAgent::new(self.work_dir(), Arc::clone(&model), executor)
                    .with_max_iterations(agents.max_iterations)
                    .with_compressor(self.compressor()),
            )
            .with_agent(
                RetrievalAgent::new(model, Arc::clone(&self.knowledge))
                    .with_compressor(self.compressor()),
            )
    }
}

#[async_trait]
impl SessionFactory for StandardSessionFactory {
    async fn build(&self, id: &str) -> anyhow::Result<AgentRegistry> {
        let mut registry = self.registry();
        if self.config.session.recover_last_session {
            if let Some(store) = &self.store {
                let restored = registry.recover(store.as_ref(), id).await?;
                info!(cid = id, restored, "memories recovered");
            }
        }
        Ok(registry)
    }
}
