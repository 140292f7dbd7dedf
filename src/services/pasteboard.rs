//! System pasteboard access.

use anyhow::{anyhow, Result};
use std::sync::Mutex;

/// The shared OS clipboard, reduced to what the history needs.
pub trait Pasteboard: Send + Sync {
    /// Marker that changes whenever the pasteboard content changes.
    fn change_marker(&self) -> u64;

    /// Current plain-text content, if any.
    fn read_text(&self) -> Option<String>;

    /// Replace the pasteboard content with plain text.
    fn write_text(&self, text: &str) -> Result<()>;
}

/// Pasteboard backed by `arboard`.
///
/// On macOS the change marker is `NSPasteboard.changeCount`, which moves on
/// every copy, including a re-copy of identical text. Elsewhere there is no
/// such counter and a [`ChangeTracker`] derives one from the text.
pub struct SystemPasteboard {
    inner: Mutex<SystemState>,
}

struct SystemState {
    clipboard: arboard::Clipboard,
    #[cfg(not(target_os = "macos"))]
    tracker: ChangeTracker,
}

impl SystemPasteboard {
    /// Open the system clipboard.
    pub fn new() -> Result<Self> {
        let clipboard = arboard::Clipboard::new()?;
        Ok(Self {
            inner: Mutex::new(SystemState {
                clipboard,
                #[cfg(not(target_os = "macos"))]
                tracker: ChangeTracker::default(),
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SystemState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Pasteboard for SystemPasteboard {
    #[cfg(target_os = "macos")]
    fn change_marker(&self) -> u64 {
        general_pasteboard_change_count()
    }

    #[cfg(not(target_os = "macos"))]
    fn change_marker(&self) -> u64 {
        let mut state = self.state();
        let current = state.clipboard.get_text().ok();
        state.tracker.observe(current)
    }

    fn read_text(&self) -> Option<String> {
        self.state().clipboard.get_text().ok()
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow!("pasteboard lock poisoned"))?;
        state.clipboard.set_text(text)?;
        Ok(())
    }
}

/// `[[NSPasteboard generalPasteboard] changeCount]`, or 0 without a pasteboard.
#[cfg(target_os = "macos")]
fn general_pasteboard_change_count() -> u64 {
    use cocoa::base::{id, nil};
    use cocoa::foundation::NSUInteger;
    use objc::{class, msg_send, sel, sel_impl};

    // SAFETY: generalPasteboard returns a process-wide singleton (or nil) and
    // changeCount takes no arguments.
    unsafe {
        let pb: id = msg_send![class!(NSPasteboard), generalPasteboard];
        if pb == nil {
            return 0;
        }
        let count: NSUInteger = msg_send![pb, changeCount];
        count as u64
    }
}

/// Change counter derived from observed text, for platforms without a
/// native one. Bumps whenever the text differs from the previous
/// observation, so a re-copy of identical text goes unnoticed.
#[cfg(any(not(target_os = "macos"), test))]
#[derive(Debug, Default)]
struct ChangeTracker {
    counter: u64,
    last_seen: Option<String>,
}

#[cfg(any(not(target_os = "macos"), test))]
impl ChangeTracker {
    fn observe(&mut self, current: Option<String>) -> u64 {
        if current != self.last_seen {
            self.last_seen = current;
            self.counter += 1;
        }
        self.counter
    }
}

/// In-process pasteboard with a real change counter.
#[derive(Default)]
pub struct MemoryPasteboard {
    inner: Mutex<(u64, Option<String>)>,
}

impl MemoryPasteboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another application copying `text`.
    pub fn copy_from_elsewhere(&self, text: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state.0 += 1;
            state.1 = Some(text.to_string());
        }
    }
}

impl Pasteboard for MemoryPasteboard {
    fn change_marker(&self) -> u64 {
        self.inner.lock().map(|s| s.0).unwrap_or(0)
    }

    fn read_text(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|s| s.1.clone())
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.copy_from_elsewhere(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pasteboard_counts_changes() {
        let pb = MemoryPasteboard::new();
        assert_eq!(pb.change_marker(), 0);
        assert_eq!(pb.read_text(), None);

        pb.copy_from_elsewhere("one");
        pb.write_text("two").unwrap();
        assert_eq!(pb.change_marker(), 2);
        assert_eq!(pb.read_text().as_deref(), Some("two"));
    }

    #[test]
    fn test_change_tracker_bumps_on_different_text() {
        let mut tracker = ChangeTracker::default();
        let first = tracker.observe(Some("a".into()));
        assert_eq!(tracker.observe(Some("a".into())), first);

        let second = tracker.observe(Some("b".into()));
        assert_ne!(second, first);
        assert_ne!(tracker.observe(None), second);
    }
}
