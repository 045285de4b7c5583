use crate::registry::AgentRegistry;
use chrono::{DateTime, Utc};
use sb_core::{AgentKind, Artifacts, AuthContext};
use serde::Serialize;
use std::fmt;

/// Orchestration phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Routing,
    Generating,
}

/// Per-conversation state. Owned by its [`crate::Interaction`] and only
/// mutated from inside a think cycle.
pub struct Session {
    pub id: String,
    pub registry: AgentRegistry,
    pub current_agent: Option<AgentKind>,
    pub last_query: Option<String>,
    pub last_answer: Option<String>,
    pub last_reasoning: Option<String>,
    pub is_generating: bool,
    pub phase: Phase,
    pub artifacts: Artifacts,
    pub auth: AuthContext,
    pub cycles: usize,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, registry: AgentRegistry) -> Self {
        Self {
            id: id.into(),
            registry,
            current_agent: None,
            last_query: None,
            last_answer: None,
            last_reasoning: None,
            is_generating: false,
            phase: Phase::Idle,
            artifacts: Artifacts::default(),
            auth: AuthContext::default(),
            cycles: 0,
            created_at: Utc::now(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            agents: self.registry.kinds(),
            current_agent: self.current_agent,
            last_query: self.last_query.clone(),
            last_answer: self.last_answer.clone(),
            last_reasoning: self.last_reasoning.clone(),
            is_generating: self.is_generating,
            phase: self.phase,
            artifacts: self.artifacts.clone(),
            cycles: self.cycles,
            created_at: self.created_at,
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session(id={}, phase={:?}, agents={})", self.id, self.phase, self.registry.len())
    }
}

/// Read-only copy of a session's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub agents: Vec<AgentKind>,
    pub current_agent: Option<AgentKind>,
    pub last_query: Option<String>,
    pub last_answer: Option<String>,
    pub last_reasoning: Option<String>,
    pub is_generating: bool,
    pub phase: Phase,
    pub artifacts: Artifacts,
    pub cycles: usize,
    pub created_at: DateTime<Utc>,
}

/// Lock-free summary used for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub generating: bool,
    pub idle_secs: u64,
}
