use sb_core::AgentKind;
use serde::{Deserialize, Serialize};

/// Keyword profile for one agent kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindProfile {
    pub kind: AgentKind,
    pub keywords: Vec<String>,
    /// Regex patterns matched against the lowercased query.
    pub patterns: Vec<String>,
    pub weight: f64,
}

/// Per-kind score.
#[derive(Debug, Clone)]
pub struct KindScore {
    pub kind: AgentKind,
    pub score: f64,
    pub signals: Vec<String>,
}

/// Scoring result from classifier.
#[derive(Debug, Clone)]
pub struct ScoringResult {
    pub scores: Vec<KindScore>,
    pub best: Option<AgentKind>,
    pub confidence: f64,
    pub signals: Vec<String>,
}

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMethod {
    Rules,
    Fallback,
}

/// Routing decision.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub kind: AgentKind,
    pub confidence: f64,
    pub method: RoutingMethod,
    pub reasoning: String,
}

/// Full routing config.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub profiles: Vec<KindProfile>,
    pub keyword_thresholds: (usize, usize), // (light, strong)
    pub keyword_scores: (f64, f64),          // (light, strong)
    pub confidence_steepness: f64,
    pub confidence_threshold: f64,
    pub fallback: Option<AgentKind>,
}

impl RoutingConfig {
    pub fn profile(&self, kind: AgentKind) -> Option<&KindProfile> {
        self.profiles.iter().find(|p| p.kind == kind)
    }
}
