//! Application state shared across all handlers.

use sb_agents::{LanguageModel, StandardSessionFactory};
use sb_core::SwitchboardConfig;
use sb_router::RuleRouter;
use sb_session::{FileMemoryStore, MemoryStore, SessionManager, StreamingResponder};
use std::sync::Arc;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub responder: StreamingResponder,
    pub config: Arc<SwitchboardConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>, config: Arc<SwitchboardConfig>) -> Self {
        Self {
            responder: StreamingResponder::new(Arc::clone(&manager)),
            manager,
            config,
            start_time: std::time::Instant::now(),
        }
    }

    /// Wire the standard agents, the rule router and, when enabled, the
    /// on-disk memory store.
    pub fn from_config(config: Arc<SwitchboardConfig>, model: Arc<dyn LanguageModel>) -> Self {
        let session = &config.session;
        let store: Option<Arc<dyn MemoryStore>> = (session.persist_memory || session.recover_last_session)
            .then(|| Arc::new(FileMemoryStore::new(session.memory_root())) as Arc<dyn MemoryStore>);

        let mut factory = StandardSessionFactory::new(Arc::clone(&config), model);
        if let Some(store) = &store {
            info!(root = %session.memory_root().display(), "memory store enabled");
            factory = factory.with_store(Arc::clone(store));
        }

        let router = RuleRouter::from_settings(&config.router);
        let mut manager = SessionManager::new(Arc::new(factory), Arc::new(router), session);
        if session.persist_memory {
            if let Some(store) = store {
                manager = manager.with_store(store);
            }
        }
        Self::new(Arc::new(manager), config)
    }
}
