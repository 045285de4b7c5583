use crate::model::{complete_or_stop, extract_reasoning, LanguageModel};
use crate::prompts;
use async_trait::async_trait;
use sb_core::{Agent, AgentFailure, AgentKind, AgentOutput, AgentRequest, Memory, Role};
use sb_session::MemoryCompressor;
use std::sync::Arc;

/// Small talk: one completion per query, no tools.
pub struct CasualAgent {
    name: String,
    languages: Vec<String>,
    model: Arc<dyn LanguageModel>,
    compressor: MemoryCompressor,
}

impl CasualAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: name.into(),
            languages: vec!["en".to_string()],
            model,
            compressor: MemoryCompressor::new(),
        }
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_compressor(mut self, compressor: MemoryCompressor) -> Self {
        self.compressor = compressor;
        self
    }
}

#[async_trait]
impl Agent for CasualAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Casual
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn initial_memory(&self) -> Memory {
        Memory::with_system_prompt(prompts::casual(&self.name, &self.languages))
    }

    async fn process(&self, request: AgentRequest<'_>, memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        memory.push(Role::User, request.query);
        self.compressor.compress(memory);

        let completion = complete_or_stop(self.model.as_ref(), memory.turns(), request.stop).await?;
        let (answer, reasoning) = extract_reasoning(&completion);
        memory.push(Role::Assistant, answer.as_str());
        Ok(AgentOutput::new(answer, reasoning))
    }
}
