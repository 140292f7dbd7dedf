//! History store - the bounded, deduplicated list of recent copies.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::models::ClipboardEntry;
use crate::services::kv_store::KeyValueStore;
use crate::services::pasteboard::Pasteboard;

/// Store key holding the serialized entry list.
pub const HISTORY_KEY: &str = "clipboardItems";

/// Number of snippets kept when the config doesn't say otherwise.
pub const DEFAULT_CAPACITY: usize = 10;

/// What `record_copy` did with a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Empty text, nothing recorded.
    Ignored,
    /// Text was already present and moved to the front.
    Promoted,
    /// New entry at the front, possibly pushing the oldest one out.
    Inserted { evicted: Option<ClipboardEntry> },
}

/// Authoritative in-memory history, kept in sync with a durable store.
///
/// Entries are ordered most-recently-used first, hold distinct contents and
/// never outnumber `capacity`. Every structural change is persisted; a failed
/// write is logged and otherwise ignored.
pub struct HistoryStore {
    entries: Vec<ClipboardEntry>,
    capacity: usize,
    store: Box<dyn KeyValueStore>,
    pasteboard: Arc<dyn Pasteboard>,
}

impl HistoryStore {
    /// Create a store and load whatever was persisted previously.
    pub fn new(
        store: Box<dyn KeyValueStore>,
        pasteboard: Arc<dyn Pasteboard>,
        capacity: usize,
    ) -> Self {
        let mut history = Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            store,
            pasteboard,
        };
        history.entries = history.load();
        debug!(count = history.entries.len(), "Loaded clipboard history");
        history
    }

    /// Current entries, most recent first.
    pub fn entries(&self) -> &[ClipboardEntry] {
        &self.entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose content contains `query`, ignoring case.
    pub fn filter(&self, query: &str) -> Vec<&ClipboardEntry> {
        self.entries.iter().filter(|e| e.matches(query)).collect()
    }

    /// Record a copy observed on the pasteboard.
    pub fn record_copy(&mut self, content: &str) -> RecordOutcome {
        if content.is_empty() {
            return RecordOutcome::Ignored;
        }

        let capacity = self.capacity;
        self.mutate(|entries| {
            let outcome = if let Some(pos) = entries.iter().position(|e| e.content == content) {
                if pos > 0 {
                    let existing = entries.remove(pos);
                    entries.insert(0, existing);
                }
                debug!(from = pos, "Promoted existing clipboard entry");
                RecordOutcome::Promoted
            } else {
                entries.insert(0, ClipboardEntry::new(content));
                let mut evicted = None;
                while entries.len() > capacity {
                    evicted = entries.pop();
                }
                debug!(len = entries.len(), evicted = evicted.is_some(), "Recorded new clipboard entry");
                RecordOutcome::Inserted { evicted }
            };
            (outcome, true)
        })
    }

    /// Put `content` back on the pasteboard. The history itself is untouched.
    pub fn copy_out(&self, content: &str) {
        if let Err(e) = self.pasteboard.write_text(content) {
            warn!("Failed to write to pasteboard: {}", e);
        }
    }

    /// Remove entries by identity. Returns how many were removed.
    pub fn delete_ids(&mut self, ids: &[Uuid]) -> usize {
        let targets: HashSet<&Uuid> = ids.iter().collect();
        self.mutate(|entries| {
            let before = entries.len();
            entries.retain(|e| !targets.contains(&e.id));
            let removed = before - entries.len();
            (removed, removed > 0)
        })
    }

    /// Remove entries at positions in `entries()`.
    ///
    /// Positions are resolved to ids before anything is removed, so the
    /// result doesn't depend on the order of `indices`. Out-of-range
    /// positions are skipped.
    pub fn delete_at(&mut self, indices: &[usize]) -> usize {
        let ids: Vec<Uuid> = indices
            .iter()
            .filter_map(|&i| self.entries.get(i).map(|e| e.id))
            .collect();
        self.delete_ids(&ids)
    }

    /// Forget everything.
    pub fn clear_all(&mut self) {
        self.mutate(|entries| {
            entries.clear();
            ((), true)
        });
    }

    /// Write the current entries to the durable store.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec(&self.entries)?;
        self.store.set(HISTORY_KEY, &encoded)
    }

    /// Read entries from the durable store.
    ///
    /// Missing or unreadable data yields an empty history. Duplicates and
    /// empty contents are dropped and the result is cut to capacity.
    pub fn load(&self) -> Vec<ClipboardEntry> {
        match self.store.get(HISTORY_KEY) {
            Ok(Some(bytes)) => decode_entries(&bytes, self.capacity),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read clipboard history: {}", e);
                Vec::new()
            }
        }
    }

    /// Apply `op` to the stored list and write it back in one store update.
    ///
    /// Other processes (daemon, CLI) share the database, so `op` always runs
    /// on what is stored right now, not on our cached copy; the result
    /// becomes the cache. `op` returns whether anything changed. If the
    /// store can't be read, `op` runs on the cache and the cache is saved.
    fn mutate<R>(&mut self, mut op: impl FnMut(&mut Vec<ClipboardEntry>) -> (R, bool)) -> R {
        let capacity = self.capacity;
        let cache = &mut self.entries;
        let mut result = None;

        let update = self.store.update(HISTORY_KEY, &mut |stored| {
            let mut entries = stored
                .map(|bytes| decode_entries(&bytes, capacity))
                .unwrap_or_default();
            let (value, changed) = op(&mut entries);
            *cache = entries;
            result = Some(value);
            if !changed {
                return None;
            }
            match serde_json::to_vec(&*cache) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    warn!("Failed to encode clipboard history: {}", e);
                    None
                }
            }
        });
        if let Err(e) = &update {
            warn!("Failed to update clipboard history: {}", e);
        }

        match result {
            Some(value) => value,
            None => {
                let (value, changed) = op(&mut self.entries);
                if changed {
                    self.persist();
                }
                value
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to save clipboard history: {}", e);
        }
    }
}

/// Decode a stored list, dropping empty and duplicate contents and
/// cutting it to `capacity`. Undecodable data counts as empty.
fn decode_entries(bytes: &[u8], capacity: usize) -> Vec<ClipboardEntry> {
    let decoded: Vec<ClipboardEntry> = match serde_json::from_slice(bytes) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Discarding unreadable clipboard history: {}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    decoded
        .into_iter()
        .filter(|e| !e.content.is_empty() && seen.insert(e.content.clone()))
        .take(capacity)
        .collect()
}
