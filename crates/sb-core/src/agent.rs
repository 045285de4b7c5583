//! The agent capability consumed by the orchestrator.

use crate::error::AgentFailure;
use crate::memory::Memory;
use crate::types::{Artifacts, AuthContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Closed set of specialist agent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Casual,
    Coder,
    Files,
    Browser,
    Retrieval,
    Planner,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Casual,
        AgentKind::Coder,
        AgentKind::Files,
        AgentKind::Browser,
        AgentKind::Retrieval,
        AgentKind::Planner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Casual => "casual",
            AgentKind::Coder => "coder",
            AgentKind::Files => "files",
            AgentKind::Browser => "browser",
            AgentKind::Retrieval => "retrieval",
            AgentKind::Planner => "planner",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "casual" | "talk" => Ok(AgentKind::Casual),
            "coder" | "code" => Ok(AgentKind::Coder),
            "files" | "file" => Ok(AgentKind::Files),
            "browser" | "web" => Ok(AgentKind::Browser),
            "retrieval" | "retrieve" => Ok(AgentKind::Retrieval),
            "planner" | "plan" => Ok(AgentKind::Planner),
            other => Err(format!("unknown agent kind: {other}")),
        }
    }
}

/// Per-call inputs besides memory.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub query: &'a str,
    pub auth: &'a AuthContext,
    /// Cancelled when the caller stops the cycle; checked between iterations.
    pub stop: &'a CancellationToken,
}

/// Result of one `process` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutput {
    pub answer: String,
    pub reasoning: String,
    pub artifacts: Artifacts,
}

impl AgentOutput {
    pub fn new(answer: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            reasoning: reasoning.into(),
            artifacts: Artifacts::default(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// A specialist that turns a query plus its memory into an answer.
///
/// `process` must return on success, when `request.stop` is cancelled, or when
/// the agent's own iteration budget runs out. It never loops forever.
#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Display name (the casual agent's name doubles as the persona name).
    fn name(&self) -> &str;

    /// Initial memory for a fresh session, usually holding the system prompt.
    fn initial_memory(&self) -> Memory {
        Memory::new()
    }

    async fn process(
        &self,
        request: AgentRequest<'_>,
        memory: &mut Memory,
    ) -> Result<AgentOutput, AgentFailure>;
}
