//! In-memory conversation history shown on the dashboard.

use parking_lot::RwLock;
use skymesh_types::{Conversation, ConversationStats, ConversationStatus};

/// Newest-first list of conversations, capped at `limit` entries
pub struct ConversationStore {
    limit: usize,
    entries: RwLock<Vec<Conversation>>,
}

impl ConversationStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Replace the conversation with the same id in place, or add it as newest
    pub fn upsert(&self, conversation: Conversation) {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|c| c.id == conversation.id) {
            *existing = conversation;
            return;
        }
        entries.insert(0, conversation);
        entries.truncate(self.limit);
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.entries.read().iter().find(|c| c.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Conversation> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> ConversationStats {
        let entries = self.entries.read();
        let mut stats = ConversationStats {
            total_questions: entries.len(),
            ..Default::default()
        };

        let mut response_times = Vec::new();
        for conversation in entries.iter() {
            match conversation.status {
                ConversationStatus::Completed => {
                    stats.total_responses += 1;
                    if let Some(ms) = conversation.response_time_ms() {
                        response_times.push(ms);
                    }
                }
                ConversationStatus::Error => stats.total_errors += 1,
                ConversationStatus::Processing => {}
            }
        }

        if !response_times.is_empty() {
            let sum: i64 = response_times.iter().sum();
            stats.avg_response_time_ms = Some(sum / response_times.len() as i64);
        }
        stats
    }
}
