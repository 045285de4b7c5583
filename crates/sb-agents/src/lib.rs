//! Reference agents for Switchboard and the collaborator contracts they use:
//! the language model, the knowledge source and the action executor.

pub mod action;
pub mod casual;
pub mod coder;
pub mod factory;
pub mod knowledge;
pub mod model;
pub mod prompts;
pub mod retrieval;

pub use action::{
    extract_blocks, remove_blocks, ActionBlock, ActionExecutor, ActionLoop, DryRunExecutor, Execution,
    LoopOutcome,
};
pub use casual::CasualAgent;
pub use coder::{CoderAgent, FileAgent};
pub use factory::StandardSessionFactory;
pub use knowledge::{EmptyKnowledge, Knowledge, KnowledgeSource, StaticKnowledge};
pub use model::{complete_or_stop, extract_reasoning, EchoModel, LanguageModel};
pub use retrieval::RetrievalAgent;
