use crate::agent::AgentKind;
use thiserror::Error;

/// Failure raised by an agent while processing a query.
#[derive(Error, Debug)]
pub enum AgentFailure {
    #[error("Language model error: {0}")]
    Model(String),
    #[error("Knowledge source error: {0}")]
    Knowledge(String),
    #[error("Missing context: {0}")]
    MissingContext(String),
    #[error("Stopped before producing an answer")]
    Stopped,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum SbError {
    #[error("Empty query")]
    EmptyQuery,
    #[error("No agent selected for query")]
    NoAgent,
    #[error("Agent {kind} failed: {source}")]
    Agent {
        kind: AgentKind,
        #[source]
        source: AgentFailure,
    },
    #[error("Session {id} could not be constructed: {message}")]
    SessionConstruction { id: String, message: String },
    #[error("Session {id} is already generating")]
    Busy { id: String },
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SbError {
    /// Stable machine-readable code, used by the HTTP and stream layers.
    pub fn code(&self) -> &'static str {
        match self {
            SbError::EmptyQuery => "rejected",
            SbError::NoAgent => "no_agent",
            SbError::Agent { .. } => "agent_failure",
            SbError::SessionConstruction { .. } => "session_failure",
            SbError::Busy { .. } => "busy",
            SbError::SessionNotFound { .. } => "not_found",
            SbError::Persistence(_) => "persistence_error",
            SbError::Config(_) => "config_error",
            SbError::Serialization(_) => "serialization_error",
            SbError::Other(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, SbError>;
