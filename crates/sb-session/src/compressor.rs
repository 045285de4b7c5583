//! Memory compressor for long agent memories.

use sb_core::{Memory, Role, Turn};

/// Memory compressor with configurable thresholds.
pub struct MemoryCompressor {
    pub max_turns: usize,
    pub keep_ratio: f64,
}

impl MemoryCompressor {
    pub fn new() -> Self {
        Self {
            max_turns: 64,
            keep_ratio: 0.3,
        }
    }

    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    pub fn needs_compression(&self, memory: &Memory) -> bool {
        memory.len() > self.max_turns
    }

    /// Compact a memory in place if it is over budget.
    ///
    /// The leading system prompt survives, the oldest turns collapse into one
    /// system summary turn and the most recent `keep_ratio` share is kept.
    /// Returns the number of turns removed.
    pub fn compress(&self, memory: &mut Memory) -> usize {
        if !self.needs_compression(memory) {
            return 0;
        }

        let turns = memory.turns();
        let (head, body) = match turns.first() {
            Some(t) if t.role == Role::System => (Some(t.clone()), &turns[1..]),
            _ => (None, turns),
        };

        let keep_count = ((body.len() as f64 * self.keep_ratio) as usize).max(1);
        let remove_count = body.len().saturating_sub(keep_count);
        if remove_count == 0 {
            return 0;
        }

        let summary = self.generate_summary(&body[..remove_count]);
        let mut compacted = Vec::with_capacity(keep_count + 2);
        compacted.extend(head);
        compacted.push(Turn::system(summary));
        compacted.extend_from_slice(&body[remove_count..]);

        memory.replace(compacted);
        remove_count
    }

    /// Generate a text summary of turns.
    pub fn generate_summary(&self, turns: &[Turn]) -> String {
        let user_turns = turns.iter().filter(|t| t.role == Role::User).count();
        let total = turns.len();

        let mut topics: Vec<String> = Vec::new();
        for turn in turns.iter().filter(|t| t.role == Role::User) {
            let content = turn.content.trim();
            if content.chars().count() > 50 {
                let head: String = content.chars().take(50).collect();
                topics.push(format!("{head}..."));
            } else if !content.is_empty() {
                topics.push(content.to_string());
            }
        }

        let topics_str = if topics.len() > 5 {
            let first_five = topics[..5].join("; ");
            format!("{} and {} more", first_five, topics.len() - 5)
        } else {
            topics.join("; ")
        };

        format!(
            "# Earlier Conversation\n\n\
            **Overview**: {} user turns, {} turns\n\
            **Topics**: {}\n",
            user_turns, total, topics_str
        )
    }
}

impl Default for MemoryCompressor {
    fn default() -> Self {
        Self::new()
    }
}
