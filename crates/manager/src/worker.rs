//! Per-batch worker.
//!
//! Lists the batch's unfinished items and uploads them with bounded
//! concurrency. Cancellation is checked before each launch; items already
//! in flight run to completion.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use fbupload_wal::{Batch, BatchId, WalError, WriteAheadLog};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::emit;
use crate::{ItemUploader, ManagerConfig, ManagerError, UploadEvent};

/// Running batches and their cancellation tokens.
pub(crate) type WorkMap = Arc<Mutex<HashMap<BatchId, CancellationToken>>>;

/// Everything a worker needs, shared by all workers of one manager.
pub(crate) struct WorkerContext {
    pub(crate) wal: WriteAheadLog,
    pub(crate) uploader: Arc<dyn ItemUploader>,
    pub(crate) config: ManagerConfig,
    pub(crate) work: WorkMap,
    pub(crate) events_tx: mpsc::UnboundedSender<UploadEvent>,
}

/// Runs a blocking log operation off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ManagerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WalError> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// Drives one batch to an end state and reports it.
pub(crate) async fn run_batch(ctx: Arc<WorkerContext>, batch: Batch, cancel: CancellationToken) {
    let id = batch.id().clone();
    let result = process_batch(&ctx, &batch, &cancel).await;

    ctx.work
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);

    match result {
        Ok(event) => {
            info!(batch = %id, event = ?event, "batch worker finished");
            emit(&ctx.events_tx, event);
        }
        Err(e) => {
            error!(batch = %id, error = %e, "batch worker aborted");
            emit(
                &ctx.events_tx,
                UploadEvent::GeneralError {
                    batch: Some(id),
                    error: Arc::new(e),
                },
            );
        }
    }
}

async fn process_batch(
    ctx: &Arc<WorkerContext>,
    batch: &Batch,
    cancel: &CancellationToken,
) -> Result<UploadEvent, ManagerError> {
    let id = batch.id().clone();

    let b = batch.clone();
    let destination = blocking(move || b.destination()).await?;
    let b = batch.clone();
    let items = blocking(move || b.list_unfinished()).await?;
    info!(batch = %id, destination = %destination, items = items.len(), "batch running");

    let limit = Arc::new(Semaphore::new(ctx.config.max_concurrent_items.max(1)));
    let mut tasks = JoinSet::new();

    for path in items {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(batch = %id, "batch cancelled, not launching more items");
                break;
            }
            permit = Arc::clone(&limit).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        tasks.spawn(upload_item(
            Arc::clone(ctx),
            batch.clone(),
            destination.clone(),
            path,
            cancel.clone(),
            permit,
        ));
    }

    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failure.get_or_insert(e);
            }
            Err(e) => {
                failure.get_or_insert(ManagerError::from(e));
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    let b = batch.clone();
    let remaining = blocking(move || b.list_unfinished()).await?;
    if remaining.is_empty() {
        let wal = ctx.wal.clone();
        let b = batch.clone();
        blocking(move || wal.remove_batch(&b)).await?;
        return Ok(UploadEvent::BatchCompleted { batch: id });
    }

    let pending = remaining.len();
    if cancel.is_cancelled() {
        Ok(UploadEvent::BatchCancelled { batch: id, pending })
    } else {
        Ok(UploadEvent::BatchIncomplete { batch: id, pending })
    }
}

/// Uploads one item, retrying resumable failures with backoff.
///
/// Only log errors are returned; upload failures become `ItemFailed` events.
async fn upload_item(
    ctx: Arc<WorkerContext>,
    batch: Batch,
    destination: String,
    path: String,
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
) -> Result<(), ManagerError> {
    let id = batch.id().clone();
    let mut attempt = 0;

    loop {
        debug!(batch = %id, path = %path, attempt, "uploading item");
        match ctx.uploader.upload(&destination, Path::new(&path)).await {
            Ok(()) => {
                let item = path.clone();
                blocking(move || batch.finish(&item)).await?;
                info!(batch = %id, path = %path, "item finished");
                emit(&ctx.events_tx, UploadEvent::ItemFinished { batch: id, path });
                return Ok(());
            }
            Err(e) if e.is_resumable() && attempt < ctx.config.resumable_retries => {
                attempt += 1;
                let delay = ctx.config.retry.delay_for_attempt(attempt);
                warn!(
                    batch = %id,
                    path = %path,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "resumable upload error, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(batch = %id, path = %path, "retry abandoned, batch cancelled");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                warn!(batch = %id, path = %path, error = %e, "item upload failed");
                emit(
                    &ctx.events_tx,
                    UploadEvent::ItemFailed {
                        batch: id,
                        path,
                        error: Arc::new(e),
                    },
                );
                return Ok(());
            }
        }
    }
}
