//! A single upload batch: its destination and pending items.

use rusqlite::{OptionalExtension, Transaction, params};
use tracing::trace;

use crate::{BatchId, DEST_KEY, Store, WalError};

/// Handle to one batch namespace in the log.
///
/// Each pending item is an entry keyed by its local path with an empty
/// value; a missing entry means the item is finished (or was never started).
#[derive(Clone)]
pub struct Batch {
    id: BatchId,
    store: Store,
}

impl Batch {
    pub(crate) fn new(id: BatchId, store: Store) -> Self {
        Self { id, store }
    }

    /// The batch identifier.
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// Marks `path` as pending.
    ///
    /// Returns `true` if it was already pending, which lets callers tell a
    /// re-enqueue after a crash apart from a fresh one.
    pub fn start(&self, path: &str) -> Result<bool, WalError> {
        reject_reserved(path)?;

        let already_pending = self.store.update(|tx| {
            ensure_exists(tx, &self.id)?;

            let existing: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT value FROM batch_entries WHERE batch_id = ?1 AND key = ?2",
                    params![self.id.as_bytes(), path],
                    |r| r.get(0),
                )
                .optional()?;
            if existing.is_some_and(|v| v.is_empty()) {
                return Ok(true);
            }

            tx.prepare_cached(
                "INSERT OR REPLACE INTO batch_entries (batch_id, key, value) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![self.id.as_bytes(), path, Vec::<u8>::new()])?;
            Ok(false)
        })?;

        trace!(batch = %self.id, path, already_pending, "item started");
        Ok(already_pending)
    }

    /// Marks `path` as finished. Finishing an item that is not pending is a no-op.
    pub fn finish(&self, path: &str) -> Result<(), WalError> {
        reject_reserved(path)?;

        self.store.update(|tx| {
            ensure_exists(tx, &self.id)?;
            tx.prepare_cached("DELETE FROM batch_entries WHERE batch_id = ?1 AND key = ?2")?
                .execute(params![self.id.as_bytes(), path])?;
            Ok(())
        })?;

        trace!(batch = %self.id, path, "item finished");
        Ok(())
    }

    /// Snapshot of the items still pending, in key order.
    ///
    /// The list can go stale as soon as it is returned; concurrent
    /// `finish` calls are not reflected.
    pub fn list_unfinished(&self) -> Result<Vec<String>, WalError> {
        self.store.view(|tx| {
            ensure_exists(tx, &self.id)?;
            let mut stmt = tx.prepare_cached(
                "SELECT key FROM batch_entries WHERE batch_id = ?1 AND key != ?2 ORDER BY key",
            )?;
            let items = stmt
                .query_map(params![self.id.as_bytes(), DEST_KEY], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
    }

    /// Remote directory the batch uploads into.
    pub fn destination(&self) -> Result<String, WalError> {
        let raw = self.store.view(|tx| {
            ensure_exists(tx, &self.id)?;
            tx.query_row(
                "SELECT value FROM batch_entries WHERE batch_id = ?1 AND key = ?2",
                params![self.id.as_bytes(), DEST_KEY],
                |r| r.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .ok_or_else(|| {
                WalError::Corrupt(format!("batch {} has no destination", self.id))
            })
        })?;

        String::from_utf8(raw).map_err(|_| {
            WalError::Corrupt(format!("batch {} destination is not valid UTF-8", self.id))
        })
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch").field("id", &self.id).finish()
    }
}

fn reject_reserved(path: &str) -> Result<(), WalError> {
    if path == DEST_KEY {
        return Err(WalError::ReservedKey(path.to_string()));
    }
    Ok(())
}

fn ensure_exists(tx: &Transaction<'_>, id: &BatchId) -> Result<(), WalError> {
    let exists: bool = tx
        .prepare_cached("SELECT EXISTS(SELECT 1 FROM batches WHERE id = ?1)")?
        .query_row(params![id.as_bytes()], |r| r.get(0))?;
    if !exists {
        return Err(WalError::BatchNotFound(id.clone()));
    }
    Ok(())
}
