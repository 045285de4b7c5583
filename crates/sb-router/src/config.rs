//! Default routing configuration with multilingual keywords.

use crate::types::*;
use sb_core::AgentKind;

fn s(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn profile(kind: AgentKind, weight: f64, keywords: &[&str], patterns: &[&str]) -> KindProfile {
    KindProfile { kind, keywords: s(keywords), patterns: s(patterns), weight }
}

/// Default routing configuration.
pub fn default_routing_config() -> RoutingConfig {
    RoutingConfig {
        profiles: vec![
            profile(AgentKind::Casual, 0.8, &[
                "hello", "hi", "hey", "thanks", "thank", "joke", "chat", "how are you", "good morning",
                "\u{4f60}\u{597d}", "\u{8c22}\u{8c22}", "\u{804a}\u{5929}",
                "bonjour", "merci", "hola", "gracias", "hallo", "danke",
            ], &[]),
            profile(AgentKind::Coder, 1.0, &[
                "code", "function", "script", "program", "compile", "debug", "bug", "python",
                "rust", "javascript", "typescript", "golang", "java", "algorithm", "class", "```",
                "\u{4ee3}\u{7801}", "\u{7f16}\u{7a0b}", "\u{51fd}\u{6570}", "\u{811a}\u{672c}",
                "funktion", "fonction",
            ], &[r"\bdef\s+\w+\(", r"\bfn\s+\w+\("]),
            profile(AgentKind::Files, 1.0, &[
                "file", "files", "folder", "directory", "rename", "move", "copy", "delete", "locate",
                "path", "disk",
                "\u{6587}\u{4ef6}", "\u{76ee}\u{5f55}", "\u{6587}\u{4ef6}\u{5939}",
                "fichier", "dossier", "datei", "archivo",
            ], &[r"\w+\.(txt|pdf|csv|md|json|log)\b"]),
            profile(AgentKind::Browser, 1.0, &[
                "search the web", "search online", "browse", "website", "web page", "url", "news",
                "latest", "google", "look up", "online",
                "\u{7f51}\u{9875}", "\u{641c}\u{7d22}", "\u{6d4f}\u{89c8}", "\u{65b0}\u{95fb}",
                "actualit\u{e9}s", "noticias",
            ], &[r"https?://"]),
            profile(AgentKind::Retrieval, 1.0, &[
                "knowledge base", "document", "documents", "according to", "policy", "handbook",
                "our docs", "manual",
                "\u{77e5}\u{8bc6}\u{5e93}", "\u{6587}\u{6863}",
                "documentation", "dokument",
            ], &[]),
            profile(AgentKind::Planner, 1.0, &[
                "plan", "step by step", "multi-step", "organize", "schedule", "itinerary", "roadmap",
                "\u{8ba1}\u{5212}", "\u{89c4}\u{5212}", "\u{6b65}\u{9aa4}",
                "planifier", "planen",
            ], &[r"first.*then"]),
        ],
        keyword_thresholds: (1, 2),
        keyword_scores: (0.5, 1.0),
        confidence_steepness: 6.0,
        confidence_threshold: 0.6,
        fallback: Some(AgentKind::Casual),
    }
}

pub static ROUTING_CONFIG: std::sync::LazyLock<RoutingConfig> = std::sync::LazyLock::new(default_routing_config);
