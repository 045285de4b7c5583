use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Turn role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One entry of an agent's conversational memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("turn_{}", Uuid::new_v4().simple()),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Serialize to a JSONL line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Deserialize from a JSONL line.
    pub fn from_jsonl(line: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Caller-supplied routing data, handed to agents untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    pub bot_key: Option<String>,
    pub org: String,
    pub uid: String,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

impl AuthContext {
    pub fn new(org: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            bot_key: None,
            org: org.into(),
            uid: uid.into(),
            extras: HashMap::new(),
        }
    }

    pub fn with_bot_key(mut self, bot_key: impl Into<String>) -> Self {
        self.bot_key = Some(bot_key.into());
        self
    }
}

/// Side products of an agent cycle, surfaced next to the answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub search: Option<String>,
    pub sources: Vec<String>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.sources.is_empty()
    }
}
