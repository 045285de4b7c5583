//! Shared types for Switchboard: agent capability, memory, errors and config.

pub mod agent;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use agent::{Agent, AgentKind, AgentOutput, AgentRequest};
pub use config::{load_config, DuplicateAnswerPolicy, SwitchboardConfig};
pub use error::{AgentFailure, Result, SbError};
pub use memory::Memory;
pub use types::{Artifacts, AuthContext, Role, Turn};

pub use tokio_util::sync::CancellationToken;
