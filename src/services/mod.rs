//! Backend services.

pub mod history;
pub mod kv_store;
pub mod login_item;
pub mod pasteboard;
pub mod watcher;

pub use history::{HistoryStore, RecordOutcome};
pub use kv_store::{KeyValueStore, MemoryStore, SqliteStore};
pub use login_item::{LaunchAgent, LoginItem};
pub use pasteboard::{Pasteboard, SystemPasteboard};
pub use watcher::PasteboardWatcher;
