//! Fenced action blocks and the loop that executes them.

use crate::model::{complete_or_stop, extract_reasoning, LanguageModel};
use async_trait::async_trait;
use regex::{Captures, Regex};
use sb_core::{AgentFailure, CancellationToken, Memory, Role};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([A-Za-z0-9_+-]+)[ \t]*\r?\n(.*?)```").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

pub const DEFAULT_LANGUAGES: &[&str] = &["bash", "sh", "python", "go", "java", "c"];
pub const DEFAULT_MAX_ITERATIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBlock {
    pub language: String,
    pub code: String,
}

/// Result of running one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub feedback: String,
    pub success: bool,
}

impl Execution {
    pub fn ok(feedback: impl Into<String>) -> Self {
        Self { feedback: feedback.into(), success: true }
    }

    pub fn failed(feedback: impl Into<String>) -> Self {
        Self { feedback: feedback.into(), success: false }
    }
}

/// Runs action blocks (shell, interpreters). Sandboxing is the executor's job.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, block: &ActionBlock) -> anyhow::Result<Execution>;
}

/// Accepts every block without running it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(&self, block: &ActionBlock) -> anyhow::Result<Execution> {
        Ok(Execution::ok(format!("{} block accepted (dry run)", block.language)))
    }
}

fn is_action(language: &str, languages: &[String]) -> bool {
    languages.iter().any(|l| l.eq_ignore_ascii_case(language))
}

/// Fenced blocks whose tag is one of `languages`, in order.
pub fn extract_blocks(text: &str, languages: &[String]) -> Vec<ActionBlock> {
    BLOCK_RE
        .captures_iter(text)
        .filter(|c| is_action(&c[1], languages))
        .map(|c| ActionBlock {
            language: c[1].to_lowercase(),
            code: c[2].trim_end().to_string(),
        })
        .collect()
}

/// `text` without its action blocks. Other fenced blocks stay.
pub fn remove_blocks(text: &str, languages: &[String]) -> String {
    let stripped = BLOCK_RE.replace_all(text, |c: &Captures| {
        if is_action(&c[1], languages) {
            String::new()
        } else {
            c[0].to_string()
        }
    });
    BLANK_LINES_RE.replace_all(&stripped, "\n\n").trim().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub answer: String,
    pub reasoning: String,
    pub iterations: usize,
    /// False when the budget ran out or a stop arrived before success.
    pub completed: bool,
}

/// Ask the model, run its blocks, feed the results back, repeat until the
/// blocks succeed, `stop` fires, or `max_iterations` is spent.
pub struct ActionLoop {
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn ActionExecutor>,
    languages: Vec<String>,
    max_iterations: usize,
}

impl ActionLoop {
    pub fn new(model: Arc<dyn LanguageModel>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            model,
            executor,
            languages: DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Drive the loop over `memory`, which must already hold the user turn.
    pub async fn run(&self, memory: &mut Memory, stop: &CancellationToken) -> Result<LoopOutcome, AgentFailure> {
        let mut last: Option<LoopOutcome> = None;

        for iteration in 1..=self.max_iterations {
            if stop.is_cancelled() {
                break;
            }
            let completion = match complete_or_stop(self.model.as_ref(), memory.turns(), stop).await {
                Ok(completion) => completion,
                Err(AgentFailure::Stopped) => break,
                Err(e) => return Err(e),
            };

            let (text, reasoning) = extract_reasoning(&completion);
            memory.push(Role::Assistant, text.as_str());
            let blocks = extract_blocks(&text, &self.languages);
            let mut outcome = LoopOutcome {
                answer: remove_blocks(&text, &self.languages),
                reasoning,
                iterations: iteration,
                completed: false,
            };

            if blocks.is_empty() {
                outcome.completed = true;
                return Ok(outcome);
            }

            let (success, feedback) = self.execute_all(&blocks, stop).await;
            memory.push(Role::Tool, feedback);
            debug!(iteration, blocks = blocks.len(), success, "action blocks executed");
            if success {
                outcome.completed = true;
                return Ok(outcome);
            }
            last = Some(outcome);
        }

        match last {
            Some(outcome) => {
                if !stop.is_cancelled() {
                    warn!(iterations = outcome.iterations, "action loop ran out of iterations");
                }
                Ok(outcome)
            }
            None => Err(AgentFailure::Stopped),
        }
    }

    /// Run blocks in order, stopping at the first failure.
    async fn execute_all(&self, blocks: &[ActionBlock], stop: &CancellationToken) -> (bool, String) {
        let mut feedback = Vec::with_capacity(blocks.len());
        for block in blocks {
            if stop.is_cancelled() {
                feedback.push("[stopped] remaining blocks skipped".to_string());
                return (false, feedback.join("\n\n"));
            }
            let execution = match self.executor.execute(block).await {
                Ok(execution) => execution,
                Err(e) => Execution::failed(e.to_string()),
            };
            let status = if execution.success { "success" } else { "failure" };
            feedback.push(format!("[{status}] {}\n{}", block.language, execution.feedback));
            if !execution.success {
                return (false, feedback.join("\n\n"));
            }
        }
        (true, feedback.join("\n\n"))
    }
}
