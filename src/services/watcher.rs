//! Pasteboard watcher - turns change-marker bumps into copied text.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::services::pasteboard::Pasteboard;

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tracks the last seen change marker of a pasteboard.
pub struct PasteboardWatcher {
    pasteboard: Arc<dyn Pasteboard>,
    last_marker: Option<u64>,
}

impl PasteboardWatcher {
    pub fn new(pasteboard: Arc<dyn Pasteboard>) -> Self {
        Self {
            pasteboard,
            last_marker: None,
        }
    }

    /// Check the pasteboard once.
    ///
    /// Returns the current text when the marker moved since the previous call
    /// and the pasteboard holds non-empty text. The first call always counts
    /// as a change.
    pub fn poll_for_change(&mut self) -> Option<String> {
        let marker = self.pasteboard.change_marker();
        if self.last_marker == Some(marker) {
            return None;
        }
        self.last_marker = Some(marker);

        self.pasteboard.read_text().filter(|text| !text.is_empty())
    }

    /// Poll on a fixed interval, sending each change to `tx`.
    ///
    /// The task ends once the receiving side is dropped.
    pub fn spawn(mut self, period: Duration, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "Watching pasteboard");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                if let Some(text) = self.poll_for_change() {
                    debug!(chars = text.chars().count(), "Pasteboard changed");
                    if tx.send(text).is_err() {
                        break;
                    }
                }
            }
            debug!("Pasteboard watcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pasteboard::MemoryPasteboard;

    #[test]
    fn test_poll_reports_only_changes() {
        let pb = Arc::new(MemoryPasteboard::new());
        pb.copy_from_elsewhere("first");
        let mut watcher = PasteboardWatcher::new(pb.clone());

        assert_eq!(watcher.poll_for_change().as_deref(), Some("first"));
        assert_eq!(watcher.poll_for_change(), None);

        pb.copy_from_elsewhere("second");
        assert_eq!(watcher.poll_for_change().as_deref(), Some("second"));
        assert_eq!(watcher.poll_for_change(), None);
    }

    #[test]
    fn test_same_text_copied_again_is_reported() {
        let pb = Arc::new(MemoryPasteboard::new());
        let mut watcher = PasteboardWatcher::new(pb.clone());
        pb.copy_from_elsewhere("same");
        assert!(watcher.poll_for_change().is_some());

        pb.copy_from_elsewhere("same");
        assert_eq!(watcher.poll_for_change().as_deref(), Some("same"));
    }

    #[test]
    fn test_empty_text_is_not_reported() {
        let pb = Arc::new(MemoryPasteboard::new());
        let mut watcher = PasteboardWatcher::new(pb.clone());
        assert_eq!(watcher.poll_for_change(), None);

        pb.copy_from_elsewhere("");
        assert_eq!(watcher.poll_for_change(), None);
    }

    #[test]
    fn test_recopy_after_clear_is_recorded_again() {
        use crate::services::history::{HistoryStore, DEFAULT_CAPACITY};
        use crate::services::kv_store::MemoryStore;

        let pb = Arc::new(MemoryPasteboard::new());
        let mut history = HistoryStore::new(Box::new(MemoryStore::new()), pb.clone(), DEFAULT_CAPACITY);
        let mut watcher = PasteboardWatcher::new(pb.clone());
        fn pump(watcher: &mut PasteboardWatcher, history: &mut HistoryStore) {
            if let Some(text) = watcher.poll_for_change() {
                history.record_copy(&text);
            }
        }

        pb.copy_from_elsewhere("x");
        pump(&mut watcher, &mut history);
        history.clear_all();
        pump(&mut watcher, &mut history);
        assert!(history.is_empty());

        // Same text, new copy: the marker moves even though the text didn't
        pb.copy_from_elsewhere("x");
        pump(&mut watcher, &mut history);
        let contents: Vec<&str> = history.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_watcher_delivers_in_order() {
        let pb = Arc::new(MemoryPasteboard::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = PasteboardWatcher::new(pb.clone()).spawn(Duration::from_millis(500), tx);

        pb.copy_from_elsewhere("a");
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        pb.copy_from_elsewhere("b");
        assert_eq!(rx.recv().await.as_deref(), Some("b"));

        drop(rx);
        tokio::time::advance(Duration::from_secs(1)).await;
        handle.await.unwrap();
    }
}
