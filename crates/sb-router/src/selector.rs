//! The router contract and its implementations.

use crate::config::ROUTING_CONFIG;
use crate::route;
use crate::types::RoutingConfig;
use sb_core::config::RouterSection;
use sb_core::AgentKind;

/// Picks the agent kind that should handle a query.
///
/// Implementations must be deterministic for identical input.
pub trait AgentRouter: Send + Sync {
    fn select(&self, query: &str, available: &[AgentKind]) -> Option<AgentKind>;
}

/// Keyword-scoring router.
#[derive(Debug, Clone)]
pub struct RuleRouter {
    config: RoutingConfig,
}

impl RuleRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    /// Default profiles tuned by the `[router]` config section.
    pub fn from_settings(settings: &RouterSection) -> Self {
        let mut config = ROUTING_CONFIG.clone();
        config.confidence_threshold = settings.confidence_threshold;
        if !settings.fallback_to_casual {
            config.fallback = None;
        }
        Self::new(config)
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }
}

impl Default for RuleRouter {
    fn default() -> Self {
        Self::new(ROUTING_CONFIG.clone())
    }
}

impl AgentRouter for RuleRouter {
    fn select(&self, query: &str, available: &[AgentKind]) -> Option<AgentKind> {
        let decision = route(query, available, &self.config)?;
        tracing::debug!(
            kind = %decision.kind,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "routing decision"
        );
        Some(decision.kind)
    }
}

/// Sends every query to one kind, if the session has it.
#[derive(Debug, Clone, Copy)]
pub struct FixedRouter(pub Option<AgentKind>);

impl AgentRouter for FixedRouter {
    fn select(&self, _query: &str, available: &[AgentKind]) -> Option<AgentKind> {
        self.0.filter(|k| available.contains(k))
    }
}
