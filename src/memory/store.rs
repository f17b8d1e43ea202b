//! Conversation history storage
//!
//! Ordered, append-only record of user and assistant turns. Role
//! alternation is expected but not enforced.

use crate::models::{HistoryEntry, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation history for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    entries: Vec<HistoryEntry>,
}

impl ConversationHistory {
    /// Create a new conversation history
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Seed a history from existing entries
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        let mut history = Self::new();
        history.entries = entries;
        history
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        self.updated_at = Utc::now();
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(HistoryEntry::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(HistoryEntry::new(Role::Assistant, content));
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get formatted conversation (used by the CLI `/history` command)
    pub fn get_formatted_context(&self) -> String {
        let mut context = String::new();
        context.push_str("## Conversation History\n\n");

        for entry in &self.entries {
            let role_str = match entry.role {
                Role::User => "**User**",
                Role::Assistant => "**Assistant**",
            };

            context.push_str(&format!(
                "{}: {} ({})\n\n",
                role_str,
                entry.content,
                entry.created_at.format("%H:%M:%S")
            ));
        }

        context
    }

    /// Clear history
    pub fn clear(&mut self) {
        self.entries.clear();
        self.updated_at = Utc::now();
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}
