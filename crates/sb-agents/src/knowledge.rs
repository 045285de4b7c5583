//! The knowledge collaborator used by retrieval.

use async_trait::async_trait;
use sb_core::AuthContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a knowledge source returns for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    /// The bot's own system prompt, if it has one.
    pub prompt: Option<String>,
    pub context: String,
    pub sources: Vec<String>,
}

/// Looks up the knowledge bases attached to a bot and returns matching chunks.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn fetch(&self, query: &str, auth: &AuthContext) -> anyhow::Result<Knowledge>;
}

/// Source with nothing in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyKnowledge;

#[async_trait]
impl KnowledgeSource for EmptyKnowledge {
    async fn fetch(&self, _query: &str, _auth: &AuthContext) -> anyhow::Result<Knowledge> {
        Ok(Knowledge::default())
    }
}

/// In-memory knowledge keyed by bot key. Documents match when they share a
/// word (3+ characters) with the query.
#[derive(Debug, Default, Clone)]
pub struct StaticKnowledge {
    bots: HashMap<String, Bot>,
}

#[derive(Debug, Default, Clone)]
struct Bot {
    prompt: Option<String>,
    documents: Vec<(String, String)>,
}

impl StaticKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, bot_key: &str, prompt: impl Into<String>) -> Self {
        self.bots.entry(bot_key.to_string()).or_default().prompt = Some(prompt.into());
        self
    }

    pub fn with_document(mut self, bot_key: &str, source: impl Into<String>, text: impl Into<String>) -> Self {
        self.bots
            .entry(bot_key.to_string())
            .or_default()
            .documents
            .push((source.into(), text.into()));
        self
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl KnowledgeSource for StaticKnowledge {
    async fn fetch(&self, query: &str, auth: &AuthContext) -> anyhow::Result<Knowledge> {
        let Some(bot) = auth.bot_key.as_deref().and_then(|k| self.bots.get(k)) else {
            anyhow::bail!("unknown bot key");
        };
        let wanted = words(query);
        let mut knowledge = Knowledge { prompt: bot.prompt.clone(), ..Default::default() };
        for (source, text) in &bot.documents {
            if words(text).iter().any(|w| wanted.contains(w)) {
                knowledge.context.push_str(text);
                knowledge.context.push('\n');
                knowledge.sources.push(source.clone());
            }
        }
        Ok(knowledge)
    }
}
