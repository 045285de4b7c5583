use crate::action::{ActionExecutor, ActionLoop};
use crate::model::LanguageModel;
use crate::prompts;
use async_trait::async_trait;
use sb_core::{Agent, AgentFailure, AgentKind, AgentOutput, AgentRequest, Memory, Role};
use sb_session::MemoryCompressor;
use std::path::PathBuf;
use std::sync::Arc;

/// Writes code and runs it through the action loop until it works.
pub struct CoderAgent {
    actions: ActionLoop,
    compressor: MemoryCompressor,
}

impl CoderAgent {
    pub fn new(model: Arc<dyn LanguageModel>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            actions: ActionLoop::new(model, executor),
            compressor: MemoryCompressor::new(),
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.actions = self.actions.with_max_iterations(max);
        self
    }

    pub fn with_compressor(mut self, compressor: MemoryCompressor) -> Self {
        self.compressor = compressor;
        self
    }
}

#[async_trait]
impl Agent for CoderAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Coder
    }

    fn name(&self) -> &str {
        "coder"
    }

    fn initial_memory(&self) -> Memory {
        Memory::with_system_prompt(prompts::CODER)
    }

    async fn process(&self, request: AgentRequest<'_>, memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        memory.push(Role::User, request.query);
        self.compressor.compress(memory);
        let outcome = self.actions.run(memory, request.stop).await?;
        Ok(AgentOutput::new(outcome.answer, outcome.reasoning))
    }
}

/// File operations confined to a working directory.
pub struct FileAgent {
    work_dir: PathBuf,
    actions: ActionLoop,
    compressor: MemoryCompressor,
}

impl FileAgent {
    pub fn new(work_dir: impl Into<PathBuf>, model: Arc<dyn LanguageModel>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            work_dir: work_dir.into(),
            actions: ActionLoop::new(model, executor).with_languages(&["bash", "sh"]),
            compressor: MemoryCompressor::new(),
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.actions = self.actions.with_max_iterations(max);
        self
    }

    pub fn with_compressor(mut self, compressor: MemoryCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }
}

#[async_trait]
impl Agent for FileAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Files
    }

    fn name(&self) -> &str {
        "files"
    }

    fn initial_memory(&self) -> Memory {
        Memory::with_system_prompt(prompts::FILES)
    }

    async fn process(&self, request: AgentRequest<'_>, memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        let query = format!("{}\nYou must work in directory: {}", request.query, self.work_dir.display());
        memory.push(Role::User, query);
        self.compressor.compress(memory);
        let outcome = self.actions.run(memory, request.stop).await?;
        Ok(AgentOutput::new(outcome.answer, outcome.reasoning))
    }
}
