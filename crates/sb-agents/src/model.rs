//! The language model collaborator.

use async_trait::async_trait;
use regex::Regex;
use sb_core::{AgentFailure, CancellationToken, Role, Turn};
use std::sync::LazyLock;

/// Chat completion backend. Implementations live outside this workspace;
/// [`EchoModel`] ships for local runs.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, turns: &[Turn]) -> anyhow::Result<String>;
}

/// Answers with the content of the last user turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, turns: &[Turn]) -> anyhow::Result<String> {
        Ok(turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .unwrap_or_default())
    }
}

/// Run one completion, giving up as soon as `stop` fires.
pub async fn complete_or_stop(
    model: &dyn LanguageModel,
    turns: &[Turn],
    stop: &CancellationToken,
) -> Result<String, AgentFailure> {
    tokio::select! {
        biased;
        _ = stop.cancelled() => Err(AgentFailure::Stopped),
        completion = model.complete(turns) => {
            completion.map_err(|e| AgentFailure::Model(format!("{}: {e}", model.name())))
        }
    }
}

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").unwrap());

/// Split a completion into `(answer, reasoning)`. `<think>` sections become
/// the reasoning, the rest the answer.
pub fn extract_reasoning(completion: &str) -> (String, String) {
    let reasoning: Vec<&str> = THINK_RE
        .captures_iter(completion)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    let answer = THINK_RE.replace_all(completion, "");
    (answer.trim().to_string(), reasoning.join("\n"))
}
