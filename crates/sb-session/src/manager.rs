use crate::interaction::Interaction;
use crate::persistence::MemoryStore;
use crate::registry::AgentRegistry;
use crate::session::SessionSummary;
use async_trait::async_trait;
use parking_lot::RwLock;
use sb_core::config::SessionConfig;
use sb_core::{CancellationToken, DuplicateAnswerPolicy, Result, SbError};
use sb_router::AgentRouter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Builds the agent set of a new session.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn build(&self, id: &str) -> anyhow::Result<AgentRegistry>;
}

/// One map entry. Empty while the session is being constructed; a failed
/// construction is kept so every caller waiting on that attempt sees it.
type Slot = Arc<OnceCell<std::result::Result<Arc<Interaction>, String>>>;

fn live(slot: &Slot) -> Option<&Arc<Interaction>> {
    slot.get().and_then(|built| built.as_ref().ok())
}

/// Process-wide registry of live sessions keyed by conversation id.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Slot>>,
    factory: Arc<dyn SessionFactory>,
    router: Arc<dyn AgentRouter>,
    store: Option<Arc<dyn MemoryStore>>,
    timeout: Duration,
    sweep_interval: Duration,
    duplicate_answers: DuplicateAnswerPolicy,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        router: Arc<dyn AgentRouter>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            router,
            store: None,
            timeout: config.timeout(),
            sweep_interval: config.sweep_interval(),
            duplicate_answers: config.duplicate_answers,
        }
    }

    /// Sessions created from now on persist their memories here on release.
    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the session for `id`, building it on first use.
    ///
    /// Concurrent callers for the same unseen id share one construction,
    /// including its failure. A failed construction leaves nothing registered.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Interaction>> {
        loop {
            let slot = self.slot(id);
            let built = slot
                .get_or_init(|| async {
                    match self.factory.build(id).await {
                        Ok(registry) => {
                            info!(cid = id, agents = registry.len(), "session created");
                            Ok(Arc::new(self.assemble(id, registry)))
                        }
                        Err(e) => {
                            warn!(cid = id, error = %e, "session construction failed");
                            Err(e.to_string())
                        }
                    }
                })
                .await;

            let interaction = match built {
                Ok(interaction) => Arc::clone(interaction),
                Err(message) => {
                    self.discard_slot(id, &slot);
                    return Err(SbError::SessionConstruction {
                        id: id.to_string(),
                        message: message.clone(),
                    });
                }
            };
            interaction.touch();
            // an eviction that won the race removed the slot before our touch
            if interaction.is_released() || !self.is_current(id, &slot) {
                debug!(cid = id, "session evicted while being looked up, retrying");
                continue;
            }
            debug!(cid = id, "session reused");
            return Ok(interaction);
        }
    }

    /// Lookup without construction.
    pub fn get(&self, id: &str) -> Option<Arc<Interaction>> {
        let interaction = live(self.sessions.read().get(id)?).cloned()?;
        interaction.touch();
        Some(interaction)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().get(id).is_some_and(|slot| live(slot).is_some())
    }

    /// Evict sessions idle longer than the timeout. Returns how many went.
    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    pub async fn evict_idle_at(&self, now: Instant) -> usize {
        let expired: Vec<Arc<Interaction>> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, slot)| {
                    live(slot).is_some_and(|i| !i.is_busy() && i.idle_for(now) > self.timeout)
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| sessions.remove(id))
                .filter_map(|slot| live(&slot).cloned())
                .collect()
        };

        for interaction in &expired {
            info!(cid = interaction.id(), "session evicted after idle timeout");
            interaction.release().await;
        }
        expired.len()
    }

    /// Run `evict_idle` every sweep interval until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {
                        let evicted = manager.evict_idle().await;
                        if evicted > 0 {
                            info!(evicted, remaining = manager.count(), "idle sweep");
                        }
                    }
                }
            }
            debug!("session sweeper stopped");
        })
    }

    /// Drop one session through its release hook.
    pub async fn remove(&self, id: &str) -> bool {
        let slot = self.sessions.write().remove(id);
        match slot.as_ref().and_then(live).cloned() {
            Some(interaction) => {
                interaction.release().await;
                info!(cid = id, "session removed");
                true
            }
            None => false,
        }
    }

    /// Release every session. Returns how many were live.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Interaction>> = {
            let mut sessions = self.sessions.write();
            sessions.drain().filter_map(|(_, slot)| live(&slot).cloned()).collect()
        };
        for interaction in &drained {
            interaction.release().await;
        }
        info!(released = drained.len(), "all sessions released");
        drained.len()
    }

    /// Summaries of live sessions, ordered by id.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .values()
            .filter_map(|slot| live(slot).map(|i| i.summary()))
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn count(&self) -> usize {
        self.sessions.read().values().filter(|slot| live(slot).is_some()).count()
    }

    fn slot(&self, id: &str) -> Slot {
        if let Some(slot) = self.sessions.read().get(id) {
            return Arc::clone(slot);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(id.to_string()).or_default())
    }

    fn is_current(&self, id: &str, slot: &Slot) -> bool {
        self.sessions.read().get(id).is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Drop `slot` if it is still the entry for `id`.
    fn discard_slot(&self, id: &str, slot: &Slot) {
        let mut sessions = self.sessions.write();
        if sessions.get(id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            sessions.remove(id);
        }
    }

    fn assemble(&self, id: &str, registry: AgentRegistry) -> Interaction {
        let interaction = Interaction::new(id, registry, Arc::clone(&self.router))
            .with_duplicate_answers(self.duplicate_answers);
        match &self.store {
            Some(store) => interaction.with_store(Arc::clone(store)),
            None => interaction,
        }
    }
}
