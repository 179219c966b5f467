//! The write-ahead log: creation, removal and listing of batches.

use rusqlite::{OptionalExtension, Transaction, params};
use tracing::{debug, info};

use crate::{BATCHES_NAMESPACE, Batch, BatchId, DEST_KEY, SCHEMA_VERSION, Store, WalError};

/// Durable record of every in-flight upload batch.
///
/// Created once at startup and shared for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct WriteAheadLog {
    store: Store,
}

impl WriteAheadLog {
    /// Binds the log to `store`, recording the schema version and making
    /// sure the batches namespace exists. Safe to call on every startup.
    pub fn new(store: Store) -> Result<Self, WalError> {
        store.update(|tx| {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES ('version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![SCHEMA_VERSION],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO sequences (name, value) VALUES (?1, 0)",
                params![BATCHES_NAMESPACE],
            )?;
            Ok(())
        })?;

        Ok(Self { store })
    }

    /// Schema version recorded in the metadata namespace.
    pub fn version(&self) -> Result<String, WalError> {
        self.store.view(|tx| {
            tx.query_row("SELECT value FROM metadata WHERE key = 'version'", [], |r| {
                r.get(0)
            })
            .optional()?
            .ok_or_else(|| WalError::Corrupt("metadata namespace has no version".into()))
        })
    }

    /// Creates a new batch uploading into `destination`.
    ///
    /// The id comes from the batches sequence, so a collision means the
    /// durable state is inconsistent and is reported as
    /// [`WalError::BatchExists`] rather than retried.
    pub fn new_batch(&self, destination: &str) -> Result<Batch, WalError> {
        let id = self.store.update(|tx| {
            let seq = next_sequence(tx, BATCHES_NAMESPACE)?;
            let id = BatchId::from_sequence(seq);

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM batches WHERE id = ?1)",
                params![id.as_bytes()],
                |r| r.get(0),
            )?;
            if exists {
                return Err(WalError::BatchExists(id));
            }

            tx.execute("INSERT INTO batches (id) VALUES (?1)", params![id.as_bytes()])?;
            tx.execute(
                "INSERT INTO batch_entries (batch_id, key, value) VALUES (?1, ?2, ?3)",
                params![id.as_bytes(), DEST_KEY, destination.as_bytes()],
            )?;

            Ok(id)
        })?;

        info!(batch = %id, destination, "created upload batch");
        Ok(Batch::new(id, self.store.clone()))
    }

    /// Deletes `batch` and everything recorded in it.
    ///
    /// Removing a batch twice fails with [`WalError::BatchNotFound`]: it
    /// usually means completion was counted twice. Once the last batch is
    /// gone the sequence restarts, so a drained log hands out the same ids
    /// as a fresh one.
    pub fn remove_batch(&self, batch: &Batch) -> Result<(), WalError> {
        let id = batch.id();
        self.store.update(|tx| {
            tx.execute(
                "DELETE FROM batch_entries WHERE batch_id = ?1",
                params![id.as_bytes()],
            )?;
            let removed = tx.execute("DELETE FROM batches WHERE id = ?1", params![id.as_bytes()])?;
            if removed == 0 {
                return Err(WalError::BatchNotFound(id.clone()));
            }

            let any_left: bool =
                tx.query_row("SELECT EXISTS(SELECT 1 FROM batches)", [], |r| r.get(0))?;
            if !any_left {
                tx.execute(
                    "UPDATE sequences SET value = 0 WHERE name = ?1",
                    params![BATCHES_NAMESPACE],
                )?;
                debug!("last batch removed, sequence reset");
            }

            Ok(())
        })?;

        info!(batch = %id, "removed upload batch");
        Ok(())
    }

    /// Returns a handle for every batch currently in the log.
    pub fn list_batches(&self) -> Result<Vec<Batch>, WalError> {
        let ids = self.store.view(|tx| {
            let mut stmt = tx.prepare_cached("SELECT id FROM batches ORDER BY id")?;
            let ids = stmt
                .query_map([], |r| r.get::<_, Vec<u8>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })?;

        Ok(ids
            .into_iter()
            .map(|bytes| Batch::new(BatchId::from_bytes(bytes), self.store.clone()))
            .collect())
    }
}

/// Increments and returns the counter for `namespace`. The first value is 1.
fn next_sequence(tx: &Transaction<'_>, namespace: &str) -> Result<u64, WalError> {
    tx.execute(
        "INSERT INTO sequences (name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1",
        params![namespace],
    )?;
    let value: i64 = tx.query_row(
        "SELECT value FROM sequences WHERE name = ?1",
        params![namespace],
        |r| r.get(0),
    )?;
    u64::try_from(value)
        .map_err(|_| WalError::Corrupt(format!("negative sequence {value} for {namespace}")))
}
