//! Data models for the clipboard history.

pub mod entry;

pub use entry::ClipboardEntry;
