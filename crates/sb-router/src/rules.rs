//! Weighted keyword classifier over agent kinds.

use crate::types::{KindProfile, KindScore, RoutingConfig, ScoringResult};
use sb_core::AgentKind;
use std::collections::HashSet;

fn tokenize(text: &str) -> HashSet<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Single ASCII words must match a whole token; phrases, symbols and
/// CJK keywords match as substrings.
fn is_word_keyword(kw: &str) -> bool {
    !kw.is_empty() && kw.chars().all(|c| c.is_ascii_alphanumeric())
}

fn keyword_matches<'a>(text: &str, words: &HashSet<&str>, keywords: &'a [String]) -> Vec<&'a str> {
    keywords
        .iter()
        .filter(|kw| {
            let kw = kw.to_lowercase();
            if is_word_keyword(&kw) {
                words.contains(kw.as_str())
            } else {
                text.contains(kw.as_str())
            }
        })
        .map(|s| s.as_str())
        .collect()
}

fn pattern_matches<'a>(text: &str, patterns: &'a [String]) -> Vec<&'a str> {
    patterns
        .iter()
        .filter(|p| regex::Regex::new(p).map(|r| r.is_match(text)).unwrap_or(false))
        .map(|s| s.as_str())
        .collect()
}

fn score_profile(text: &str, words: &HashSet<&str>, profile: &KindProfile, config: &RoutingConfig) -> KindScore {
    let mut matches = keyword_matches(text, words, &profile.keywords);
    matches.extend(pattern_matches(text, &profile.patterns));
    let count = matches.len();

    let (light, strong) = config.keyword_thresholds;
    let raw = if count >= strong {
        config.keyword_scores.1
    } else if count >= light {
        config.keyword_scores.0
    } else {
        0.0
    };

    let signals = if count > 0 {
        let top: Vec<_> = matches.iter().take(3).copied().collect();
        vec![format!("{} ({})", profile.kind, top.join(", "))]
    } else {
        Vec::new()
    };

    KindScore { kind: profile.kind, score: raw * profile.weight, signals }
}

fn sigmoid(distance: f64, steepness: f64) -> f64 {
    1.0 / (1.0 + (-steepness * distance).exp())
}

/// Score every available kind and pick the best one.
///
/// Ties keep the earliest kind in `available`. `best` is `None` when nothing
/// scored or the margin over the runner-up is below the confidence threshold.
pub fn classify_by_rules(query: &str, available: &[AgentKind], config: &RoutingConfig) -> ScoringResult {
    let text = query.to_lowercase();
    let words = tokenize(&text);

    let scores: Vec<KindScore> = available
        .iter()
        .filter_map(|kind| config.profile(*kind))
        .map(|p| score_profile(&text, &words, p, config))
        .collect();

    let signals: Vec<String> = scores.iter().flat_map(|s| s.signals.iter().cloned()).collect();

    let mut best: Option<&KindScore> = None;
    let mut runner_up = 0.0_f64;
    for s in &scores {
        match best {
            Some(b) if s.score <= b.score => runner_up = runner_up.max(s.score),
            Some(b) => {
                runner_up = runner_up.max(b.score);
                best = Some(s);
            }
            None => best = Some(s),
        }
    }

    let Some(best) = best.filter(|b| b.score > 0.0) else {
        return ScoringResult { scores, best: None, confidence: 0.0, signals };
    };

    let confidence = sigmoid(best.score - runner_up, config.confidence_steepness);
    let kind = best.kind;
    if confidence < config.confidence_threshold {
        return ScoringResult { scores, best: None, confidence, signals };
    }

    ScoringResult { scores, best: Some(kind), confidence, signals }
}
