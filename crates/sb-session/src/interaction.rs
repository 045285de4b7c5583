//! The think cycle of one session: route, run the agent, record the result.

use crate::persistence::MemoryStore;
use crate::registry::AgentRegistry;
use crate::session::{Phase, Session, SessionSnapshot, SessionSummary};
use parking_lot::Mutex as SyncMutex;
use sb_core::{
    AgentFailure, AgentKind, AgentRequest, Artifacts, AuthContext, CancellationToken, DuplicateAnswerPolicy,
    Memory, Result, Role, SbError,
};
use sb_router::AgentRouter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a think cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ThinkOutcome {
    /// Empty query; nothing happened.
    Rejected,
    /// The router found no agent; session unchanged.
    NoAgent,
    Answered(CycleResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleResult {
    pub agent: AgentKind,
    /// `None` when the duplicate-answer rule suppressed a repeated answer.
    pub answer: Option<String>,
    pub reasoning: String,
    pub artifacts: Artifacts,
    /// The cycle's stop token was cancelled while the agent ran.
    pub stopped: bool,
}

/// Clears a lock-free flag even if the cycle future is dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }

    /// `None` if the flag is already set.
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Uninstalls the cycle's stop token on every exit path.
struct StopSlot<'a>(&'a SyncMutex<Option<CancellationToken>>);

impl<'a> StopSlot<'a> {
    fn install(slot: &'a SyncMutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *slot.lock() = Some(token);
        Self(slot)
    }
}

impl Drop for StopSlot<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Orchestrator owning one session.
pub struct Interaction {
    id: String,
    router: Arc<dyn AgentRouter>,
    duplicate_answers: DuplicateAnswerPolicy,
    store: Option<Arc<dyn MemoryStore>>,
    /// Held for a whole cycle; the only thing `think` checks for busyness.
    busy: AtomicBool,
    /// Set while the agent runs.
    generating: AtomicBool,
    released: AtomicBool,
    pub(crate) session: Mutex<Session>,
    cycle_stop: SyncMutex<Option<CancellationToken>>,
    last_active: SyncMutex<Instant>,
}

impl Interaction {
    pub fn new(id: impl Into<String>, registry: AgentRegistry, router: Arc<dyn AgentRouter>) -> Self {
        let id = id.into();
        Self {
            session: Mutex::new(Session::new(id.clone(), registry)),
            id,
            router,
            duplicate_answers: DuplicateAnswerPolicy::default(),
            store: None,
            busy: AtomicBool::new(false),
            generating: AtomicBool::new(false),
            released: AtomicBool::new(false),
            cycle_stop: SyncMutex::new(None),
            last_active: SyncMutex::new(Instant::now()),
        }
    }

    pub fn with_duplicate_answers(mut self, policy: DuplicateAnswerPolicy) -> Self {
        self.duplicate_answers = policy;
        self
    }

    /// Memories are written to `store` when the session is released.
    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A cycle holds the session, whatever its phase.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    pub fn last_active(&self) -> Instant {
        *self.last_active.lock()
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            generating: self.is_generating(),
            idle_secs: self.idle_for(Instant::now()).as_secs(),
        }
    }

    /// Copy of the session state; waits for an in-flight cycle to finish.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Copy of one agent's memory.
    pub async fn memory(&self, kind: AgentKind) -> Option<Memory> {
        self.session.lock().await.registry.memory(kind).cloned()
    }

    pub async fn default_agent_name(&self) -> String {
        self.session.lock().await.registry.default_agent_name().to_string()
    }

    /// Run one cycle for `query`.
    ///
    /// A second call while a cycle is in flight fails with [`SbError::Busy`]
    /// without touching the session.
    pub async fn think(&self, query: &str, auth: AuthContext) -> Result<ThinkOutcome> {
        self.think_until(query, auth, CancellationToken::new()).await
    }

    /// [`Interaction::think`], also stopped when `caller` is cancelled, even if
    /// that happens before the cycle starts.
    pub async fn think_until(&self, query: &str, auth: AuthContext, caller: CancellationToken) -> Result<ThinkOutcome> {
        if query.trim().is_empty() {
            debug!(cid = %self.id, "empty query rejected");
            return Ok(ThinkOutcome::Rejected);
        }

        let _busy = FlagGuard::claim(&self.busy).ok_or_else(|| SbError::Busy { id: self.id.clone() })?;
        let stop = caller.child_token();
        // installed before the release check so `release` always reaches it
        let _stop_slot = StopSlot::install(&self.cycle_stop, stop.clone());
        if self.is_released() {
            return Err(SbError::SessionNotFound { id: self.id.clone() });
        }

        let mut session = self.session.lock().await;
        if self.is_released() {
            return Err(SbError::SessionNotFound { id: self.id.clone() });
        }
        if session.is_generating {
            // left over from a cycle whose future was dropped mid-flight
            warn!(cid = %self.id, "resetting stale generating state");
            session.is_generating = false;
            session.phase = Phase::Idle;
        }

        session.phase = Phase::Routing;
        let kinds = session.registry.kinds();
        let Some(kind) = self.router.select(query, &kinds).filter(|k| kinds.contains(k)) else {
            session.phase = Phase::Idle;
            info!(cid = %self.id, "no agent selected");
            return Ok(ThinkOutcome::NoAgent);
        };

        let prior_answer = session.last_answer.clone();
        let handoff = match (session.current_agent, &prior_answer) {
            (Some(previous), Some(answer)) if previous != kind => Some((previous, answer.clone())),
            _ => None,
        };
        info!(cid = %self.id, agent = %kind, bot_key = ?auth.bot_key, "agent selected");

        let generating = FlagGuard::engage(&self.generating);

        session.last_query = Some(query.to_string());
        session.auth = auth;
        session.phase = Phase::Generating;
        session.is_generating = true;

        let result = {
            let Session { registry, auth, .. } = &mut *session;
            match registry.get_mut(kind) {
                Some(slot) => {
                    let agent = slot.agent.clone();
                    let request = AgentRequest { query, auth: &*auth, stop: &stop };
                    agent.process(request, &mut slot.memory).await
                }
                None => Err(AgentFailure::Other(anyhow::anyhow!("agent {kind} not registered"))),
            }
        };

        session.is_generating = false;
        session.phase = Phase::Idle;
        drop(generating);
        self.touch();

        let output = match result {
            Ok(output) => output,
            Err(source) => {
                warn!(cid = %self.id, agent = %kind, error = %source, "agent failed");
                return Err(SbError::Agent { kind, source });
            }
        };

        session.current_agent = Some(kind);
        session.last_reasoning = Some(output.reasoning.clone());
        session.artifacts = output.artifacts.clone();
        session.cycles += 1;

        if let Some((previous, answer)) = handoff {
            if let Some(memory) = session.registry.memory_mut(previous) {
                memory.push(Role::Assistant, answer);
                debug!(cid = %self.id, from = %previous, to = %kind, "previous answer handed back");
            }
        }

        let repeated = prior_answer.as_deref() == Some(output.answer.as_str());
        let answer = if repeated && self.duplicate_answers == DuplicateAnswerPolicy::Suppress {
            debug!(cid = %self.id, "answer identical to previous one, suppressed");
            None
        } else {
            Some(output.answer)
        };
        session.last_answer = answer.clone();

        Ok(ThinkOutcome::Answered(CycleResult {
            agent: kind,
            answer,
            reasoning: output.reasoning,
            artifacts: output.artifacts,
            stopped: stop.is_cancelled(),
        }))
    }

    /// Ask the in-flight cycle to stop. Returns whether one was running.
    /// A cycle that has not started yet is not affected; use
    /// [`Interaction::think_until`] for that.
    pub fn stop(&self) -> bool {
        match self.cycle_stop.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Release hook: stops any cycle and persists memories. Runs once;
    /// later calls return `false`.
    pub async fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.stop();
        if let Some(store) = &self.store {
            let session = self.session.lock().await;
            if let Err(e) = session.registry.persist(store.as_ref(), &self.id).await {
                warn!(cid = %self.id, error = %e, "failed to persist memories");
            }
        }
        info!(cid = %self.id, "session released");
        true
    }
}
