use crate::knowledge::KnowledgeSource;
use crate::model::{complete_or_stop, extract_reasoning, LanguageModel};
use crate::prompts;
use async_trait::async_trait;
use sb_core::{Agent, AgentFailure, AgentKind, AgentOutput, AgentRequest, Artifacts, Memory, Role};
use sb_session::MemoryCompressor;
use std::sync::Arc;
use tracing::debug;

/// Answers from the knowledge bases attached to the caller's bot.
pub struct RetrievalAgent {
    model: Arc<dyn LanguageModel>,
    knowledge: Arc<dyn KnowledgeSource>,
    compressor: MemoryCompressor,
}

impl RetrievalAgent {
    pub fn new(model: Arc<dyn LanguageModel>, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        Self { model, knowledge, compressor: MemoryCompressor::new() }
    }

    pub fn with_compressor(mut self, compressor: MemoryCompressor) -> Self {
        self.compressor = compressor;
        self
    }
}

#[async_trait]
impl Agent for RetrievalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Retrieval
    }

    fn name(&self) -> &str {
        "retrieval"
    }

    async fn process(&self, request: AgentRequest<'_>, memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        if request.auth.bot_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(AgentFailure::MissingContext("retrieval needs a bot key".into()));
        }

        let knowledge = tokio::select! {
            biased;
            _ = request.stop.cancelled() => return Err(AgentFailure::Stopped),
            fetched = self.knowledge.fetch(request.query, request.auth) => {
                fetched.map_err(|e| AgentFailure::Knowledge(e.to_string()))?
            }
        };
        debug!(sources = knowledge.sources.len(), "knowledge fetched");

        let prompt = knowledge
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(prompts::RETRIEVAL);
        memory.push(
            Role::User,
            format!("{prompt}\nUser Query: {}\nContext: {}", request.query, knowledge.context),
        );
        self.compressor.compress(memory);

        let completion = complete_or_stop(self.model.as_ref(), memory.turns(), request.stop).await?;
        let (answer, reasoning) = extract_reasoning(&completion);
        memory.push(Role::Assistant, answer.as_str());

        let artifacts = Artifacts { search: None, sources: knowledge.sources };
        Ok(AgentOutput::new(answer, reasoning).with_artifacts(artifacts))
    }
}
