//! Turns one think cycle into an ordered event stream.

use crate::interaction::ThinkOutcome;
use crate::manager::SessionManager;
use sb_core::{AuthContext, CancellationToken, SbError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

/// Inbound query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub bot_key: Option<String>,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub cid: Option<String>,
    /// Unknown fields, handed to agents untouched.
    #[serde(flatten)]
    pub extras: HashMap<String, serde_json::Value>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            uid: uid.into(),
            ..Default::default()
        }
    }

    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    pub fn auth_context(&self) -> AuthContext {
        AuthContext {
            bot_key: self.bot_key.clone(),
            org: self.org.clone(),
            uid: self.uid.clone(),
            extras: self.extras.clone(),
        }
    }

    /// The caller's `cid`, or one derived from `uid` and `timestamp`.
    pub fn conversation_id(&self, timestamp: f64) -> String {
        match self.cid.as_deref().map(str::trim) {
            Some(cid) if !cid.is_empty() => cid.to_string(),
            _ => derive_conversation_id(&self.uid, timestamp),
        }
    }
}

/// UUIDv5 in the DNS namespace over `uid` followed by the timestamp.
pub fn derive_conversation_id(uid: &str, timestamp: f64) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, format!("{uid}{timestamp}").as_bytes()).to_string()
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// One line of the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamEvent {
    Running,
    Success {
        /// `null` when the answer repeated the previous one.
        answer: Option<String>,
        thinking: String,
        /// Seconds since the request was accepted.
        end: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sources: Vec<String>,
    },
    Error {
        code: String,
        message: String,
        end: u64,
    },
}

impl StreamEvent {
    pub fn failure(error: &SbError, end: u64) -> Self {
        StreamEvent::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            end,
        }
    }

    fn from_outcome(outcome: sb_core::Result<ThinkOutcome>, end: u64) -> Self {
        match outcome {
            Ok(ThinkOutcome::Answered(cycle)) => StreamEvent::Success {
                answer: cycle.answer,
                thinking: cycle.reasoning,
                end,
                search: cycle.artifacts.search,
                sources: cycle.artifacts.sources,
            },
            Ok(ThinkOutcome::Rejected) => Self::failure(&SbError::EmptyQuery, end),
            Ok(ThinkOutcome::NoAgent) => Self::failure(&SbError::NoAgent, end),
            Err(e) => Self::failure(&e, end),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Running)
    }

    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"ERROR","code":"serialization_error","message":"{e}","end":0}}"#)
        });
        line.push('\n');
        line
    }
}

/// Drives think cycles on behalf of streaming callers.
#[derive(Clone)]
pub struct StreamingResponder {
    manager: Arc<SessionManager>,
}

impl StreamingResponder {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Start a cycle for `request`. Returns the conversation id and the event
    /// stream: `RUNNING`, then exactly one `SUCCESS` or `ERROR`.
    ///
    /// Dropping the stream before the terminal event stops the cycle.
    pub fn respond(&self, request: QueryRequest) -> (String, ReceiverStream<StreamEvent>) {
        let cid = request.conversation_id(unix_now());
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(run_cycle(Arc::clone(&self.manager), cid.clone(), request, tx));
        (cid, ReceiverStream::new(rx))
    }
}

async fn run_cycle(
    manager: Arc<SessionManager>,
    cid: String,
    request: QueryRequest,
    tx: mpsc::Sender<StreamEvent>,
) {
    let started = Instant::now();
    if tx.send(StreamEvent::Running).await.is_err() {
        return;
    }

    let terminal = match manager.get_or_create(&cid).await {
        Err(e) => StreamEvent::failure(&e, started.elapsed().as_secs()),
        Ok(interaction) => {
            info!(cid = %cid, uid = %request.uid, "starting cycle");
            let (done_tx, done_rx) = oneshot::channel();
            let caller = CancellationToken::new();
            let worker = Arc::clone(&interaction);
            let auth = request.auth_context();
            let query = request.query;
            let cycle_caller = caller.clone();
            tokio::spawn(async move {
                let _ = done_tx.send(worker.think_until(&query, auth, cycle_caller).await);
            });

            tokio::select! {
                outcome = done_rx => {
                    let end = started.elapsed().as_secs();
                    match outcome {
                        Ok(outcome) => StreamEvent::from_outcome(outcome, end),
                        Err(_) => StreamEvent::failure(
                            &SbError::Other(anyhow::anyhow!("cycle aborted")),
                            end,
                        ),
                    }
                }
                _ = tx.closed() => {
                    debug!(cid = %cid, "caller went away, stopping cycle");
                    caller.cancel();
                    return;
                }
            }
        }
    };

    let _ = tx.send(terminal).await;
    manager.evict_idle().await;
}
