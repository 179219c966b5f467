//! Transactional wrapper over the embedded SQLite database.
//!
//! The log needs nested namespaces and atomic read/modify/write. SQLite
//! gives both: each namespace is a table (batch contents are rows keyed by
//! batch id), and every operation runs inside one transaction on a single
//! connection, so writers are serialized.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::WalError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Namespace-local counters, one row per namespace.
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

-- One row per batch namespace under "batches".
CREATE TABLE IF NOT EXISTS batches (
    id BLOB PRIMARY KEY
);

-- Contents of each batch namespace: "dest" plus one row per pending item.
CREATE TABLE IF NOT EXISTS batch_entries (
    batch_id BLOB NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (batch_id, key)
);
"#;

/// Handle to the durable store. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (or creates) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        debug!(path = %path.display(), "opened write-ahead log store");
        Self::init(conn)
    }

    /// Opens a private in-memory database (for testing).
    pub fn in_memory() -> Result<Self, WalError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, WalError> {
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` inside a write transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise.
    pub fn update<T, F>(&self, f: F) -> Result<T, WalError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, WalError>,
    {
        let mut conn = self.conn.lock().map_err(|_| WalError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Runs `f` inside a read transaction, giving it a consistent snapshot.
    pub fn view<T, F>(&self, f: F) -> Result<T, WalError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, WalError>,
    {
        let mut conn = self.conn.lock().map_err(|_| WalError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let out = f(&tx)?;
        tx.finish()?;
        Ok(out)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_rolls_back_on_error() {
        let store = Store::in_memory().unwrap();

        let result: Result<(), WalError> = store.update(|tx| {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES ('k', 'v')",
                [],
            )?;
            Err(WalError::Corrupt("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = store
            .view(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM metadata", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_creates_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.db");

        let store = Store::open(&path).unwrap();
        store
            .update(|tx| {
                tx.execute("INSERT INTO metadata (key, value) VALUES ('k', 'v')", [])?;
                Ok(())
            })
            .unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        let value: String = reopened
            .view(|tx| {
                Ok(tx.query_row("SELECT value FROM metadata WHERE key = 'k'", [], |r| {
                    r.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(value, "v");
    }
}
