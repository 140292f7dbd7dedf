//! Durable key-value storage for the serialized history.

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::PersistenceError;

/// Callback for [`KeyValueStore::update`]: receives the stored value and
/// returns the replacement, or `None` to leave it alone.
pub type UpdateFn<'a> = dyn FnMut(Option<Vec<u8>>) -> Option<Vec<u8>> + 'a;

/// Byte-oriented key-value store.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;

    /// Read-modify-write of one key.
    ///
    /// Stores shared between processes must run this atomically. `f` is
    /// called at most once.
    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), PersistenceError> {
        let current = self.get(key)?;
        if let Some(next) = f(current) {
            self.set(key, &next)?;
        }
        Ok(())
    }
}

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store with a single `kv` table.
///
/// Several processes (popover, background daemon, one-shot CLI commands)
/// may open the same file; `update` serializes them with an immediate
/// transaction.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a throwaway in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY,
                 value BLOB NOT NULL
             );",
        )?;
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), PersistenceError> {
        // Take the write lock before reading so no other process can slip a
        // write in between. Dropping `tx` without commit rolls back.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let current = self.get(key)?;
        if let Some(next) = f(current) {
            self.set(key, &next)?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Volatile store used in tests and as a fallback when the database can't be opened.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let values = match self.values.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        let mut values = match self.values.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Lets a test keep a handle on the store it hands to a history.
#[cfg(test)]
impl<T: KeyValueStore + Sync> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), PersistenceError> {
        (**self).update(key, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_get_missing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_set_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", b"first").unwrap();
        store.set("k", b"second").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        SqliteStore::open(&path).unwrap().set("k", b"v").unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn test_update_writes_replacement() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", b"1").unwrap();

        store
            .update("k", &mut |current| {
                assert_eq!(current.as_deref(), Some(&b"1"[..]));
                Some(b"2".to_vec())
            })
            .unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn test_update_none_keeps_value() {
        let store = MemoryStore::new();
        store.set("k", b"keep").unwrap();
        store.update("k", &mut |_| None).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"keep"[..]));
    }

    #[test]
    fn test_update_sees_other_connection_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        second.set("k", b"from second").unwrap();
        let mut seen = None;
        first
            .update("k", &mut |current| {
                seen = current;
                None
            })
            .unwrap();
        assert_eq!(seen.as_deref(), Some(&b"from second"[..]));
    }
}
