//! Switchboard router: weighted keyword classifier over agent kinds with multilingual support.

pub mod types;
pub mod rules;
pub mod config;
pub mod selector;

pub use types::*;
pub use rules::classify_by_rules;
pub use config::ROUTING_CONFIG;
pub use selector::*;

use sb_core::AgentKind;

/// Route a query to one of the `available` agent kinds.
///
/// Falls back to `config.fallback` (when available) if no kind wins with
/// enough confidence; `None` if even that is impossible.
pub fn route(query: &str, available: &[AgentKind], config: &RoutingConfig) -> Option<RoutingDecision> {
    if query.trim().is_empty() || available.is_empty() {
        return None;
    }

    let result = classify_by_rules(query, available, config);

    if let Some(kind) = result.best {
        return Some(RoutingDecision {
            kind,
            confidence: result.confidence,
            method: RoutingMethod::Rules,
            reasoning: format!("confidence={:.2} | {}", result.confidence, result.signals.join(", ")),
        });
    }

    let fallback = config.fallback.filter(|k| available.contains(k))?;
    Some(RoutingDecision {
        kind: fallback,
        confidence: result.confidence,
        method: RoutingMethod::Fallback,
        reasoning: format!(
            "confidence={:.2} | {} | ambiguous -> default: {}",
            result.confidence,
            result.signals.join(", "),
            fallback
        ),
    })
}
