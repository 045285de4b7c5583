//! Session-keyed orchestration: the session manager, the think cycle and the
//! streaming responder.

pub mod compressor;
pub mod interaction;
pub mod manager;
pub mod persistence;
pub mod registry;
pub mod responder;
pub mod session;

pub use compressor::MemoryCompressor;
pub use interaction::{CycleResult, Interaction, ThinkOutcome};
pub use manager::{SessionFactory, SessionManager};
pub use persistence::{FileMemoryStore, MemoryStore};
pub use registry::{AgentRegistry, AgentSlot};
pub use responder::{derive_conversation_id, QueryRequest, StreamEvent, StreamingResponder};
pub use session::{Phase, Session, SessionSnapshot, SessionSummary};

#[cfg(test)]
mod tests;
