//! Agent conversational memory.

use crate::types::{Role, Turn};
use serde::{Deserialize, Serialize};

/// Ordered turns scoped to one agent in one session.
///
/// Append-only except for [`Memory::replace`], used by compaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    turns: Vec<Turn>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self { turns: vec![Turn::system(prompt)] }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Turn {
        self.turns.push(Turn::new(role, content));
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Last turn with the given role.
    pub fn last_of(&self, role: Role) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == role)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
    }

    /// Swap the whole turn list (compaction).
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Serialize all turns to JSONL.
    pub fn to_jsonl(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.to_jsonl())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse turns from JSONL, skipping blank lines.
    pub fn from_jsonl(content: &str) -> anyhow::Result<Self> {
        let mut turns = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            turns.push(Turn::from_jsonl(line)?);
        }
        Ok(Self { turns })
    }
}
