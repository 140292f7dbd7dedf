//! A single remembered clipboard snippet.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One text snippet in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    /// Stable identity, survives promotion and restarts
    pub id: Uuid,
    /// Copied text (never empty)
    pub content: String,
    /// When the snippet was first copied
    pub timestamp: DateTime<Utc>,
}

impl ClipboardEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Case-insensitive substring match against the content.
    pub fn matches(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        self.content.to_lowercase().contains(&query.to_lowercase())
    }

    /// Single-line preview, truncated to `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        let flattened: String = self
            .content
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let flattened = flattened.trim();

        if flattened.chars().count() > max_chars {
            let cut: String = flattened.chars().take(max_chars).collect();
            format!("{}...", cut)
        } else {
            flattened.to_string()
        }
    }

    /// Timestamp rendered in local time.
    pub fn formatted_time(&self, format: &str) -> String {
        self.timestamp.with_timezone(&Local).format(format).to_string()
    }
}
