use std::collections::VecDeque;

use super::family::ModelFamily;
use super::DEFAULT_HISTORY_CAPACITY;

/// Bounded log of raw user prompts, oldest first.
///
/// The rendered history is substituted into a family template as one block, so earlier
/// turns reach the model as plain newline-separated text rather than per-turn markup.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn append(&mut self, prompt: impl Into<String>) {
        self.entries.push_back(prompt.into());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render the history into `family`'s template
    pub fn format_for(&self, family: ModelFamily) -> String {
        family.format_prompt(&self.render())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
