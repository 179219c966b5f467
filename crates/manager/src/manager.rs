//! Upload manager: intake queue, batch workers and crash recovery.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use fbupload_wal::{Batch, BatchId, WriteAheadLog};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::worker::{WorkerContext, blocking, run_batch};
use crate::{ItemUploader, ManagerConfig, ManagerError, UploadEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Accepts upload batches, persists them to the write-ahead log and
/// uploads them in the background.
pub struct UploadManager {
    ctx: Arc<WorkerContext>,
    lifecycle: Mutex<Lifecycle>,
    intake_tx: mpsc::Sender<Batch>,
    intake_rx: Mutex<Option<mpsc::Receiver<Batch>>>,
    shutdown: CancellationToken,
    intake_loop: Mutex<Option<JoinHandle<()>>>,
    events_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<UploadEvent>>>,
}

impl UploadManager {
    pub fn new(
        wal: WriteAheadLog,
        uploader: Arc<dyn ItemUploader>,
        config: ManagerConfig,
    ) -> Self {
        let (intake_tx, intake_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ctx = WorkerContext {
            wal,
            uploader,
            config,
            work: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
        };

        Self {
            ctx: Arc::new(ctx),
            lifecycle: Mutex::new(Lifecycle::Idle),
            intake_tx,
            intake_rx: Mutex::new(Some(intake_rx)),
            shutdown: CancellationToken::new(),
            intake_loop: Mutex::new(None),
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Recovers persisted batches and starts the intake loop.
    ///
    /// Batches with no unfinished items are left over from a run that died
    /// before cleanup; they are removed. The rest are queued again and their
    /// ids returned.
    pub async fn start(&self) -> Result<Vec<BatchId>, ManagerError> {
        {
            let lifecycle = self.lifecycle();
            match *lifecycle {
                Lifecycle::Idle => {}
                Lifecycle::Running => return Err(ManagerError::AlreadyStarted),
                Lifecycle::Stopped => return Err(ManagerError::Stopped),
            }
        }

        let wal = self.ctx.wal.clone();
        let recovered = blocking(move || {
            let mut pending = Vec::new();
            for batch in wal.list_batches()? {
                if batch.list_unfinished()?.is_empty() {
                    info!(batch = %batch.id(), "removing dangling batch");
                    wal.remove_batch(&batch)?;
                } else {
                    pending.push(batch);
                }
            }
            Ok(pending)
        })
        .await?;

        {
            let mut lifecycle = self.lifecycle();
            if *lifecycle != Lifecycle::Idle {
                return Err(ManagerError::AlreadyStarted);
            }
            let Some(rx) = self
                .intake_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            else {
                return Err(ManagerError::AlreadyStarted);
            };
            let handle = tokio::spawn(intake_loop(
                Arc::clone(&self.ctx),
                rx,
                self.shutdown.clone(),
            ));
            *self
                .intake_loop
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(handle);
            *lifecycle = Lifecycle::Running;
        }

        let ids: Vec<BatchId> = recovered.iter().map(|b| b.id().clone()).collect();
        info!(recovered = ids.len(), "upload manager started");
        for batch in recovered {
            self.intake_tx
                .send(batch)
                .await
                .map_err(|_| ManagerError::Stopped)?;
        }
        Ok(ids)
    }

    /// Persists a new batch for `paths` and queues it.
    ///
    /// The batch is durable before this returns. Waits while the intake
    /// queue is full.
    pub async fn begin_upload(
        &self,
        destination: &str,
        paths: &[PathBuf],
    ) -> Result<BatchId, ManagerError> {
        match *self.lifecycle() {
            Lifecycle::Running => {}
            Lifecycle::Idle => return Err(ManagerError::NotStarted),
            Lifecycle::Stopped => return Err(ManagerError::Stopped),
        }

        let items = paths
            .iter()
            .map(|p| {
                p.to_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ManagerError::NonUtf8Path(p.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let wal = self.ctx.wal.clone();
        let destination = destination.to_string();
        let batch = blocking(move || {
            let batch = wal.new_batch(&destination)?;
            for item in &items {
                batch.start(item)?;
            }
            Ok(batch)
        })
        .await?;

        let id = batch.id().clone();
        debug!(batch = %id, items = paths.len(), "batch persisted, queueing");
        self.intake_tx
            .send(batch)
            .await
            .map_err(|_| ManagerError::Stopped)?;
        Ok(id)
    }

    /// Cancels a running batch. Items in flight finish; no new ones start.
    ///
    /// Returns `false` if the batch is not currently running.
    pub fn cancel_batch(&self, id: &BatchId) -> bool {
        let work = self.ctx.work.lock().unwrap_or_else(PoisonError::into_inner);
        match work.get(id) {
            Some(token) => {
                info!(batch = %id, "cancelling batch");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of batches with a running worker.
    pub fn active_batches(&self) -> Vec<BatchId> {
        let mut ids: Vec<BatchId> = self
            .ctx
            .work
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Cancels every batch, waits for in-flight items and the intake loop.
    ///
    /// Queued batches that never started stay in the log for the next run.
    pub async fn stop(&self) -> Result<(), ManagerError> {
        {
            let mut lifecycle = self.lifecycle();
            if *lifecycle == Lifecycle::Stopped {
                return Ok(());
            }
            *lifecycle = Lifecycle::Stopped;
        }

        info!("stopping upload manager");
        self.shutdown.cancel();

        let handle = self
            .intake_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.await?;
        }
        info!("upload manager stopped");
        Ok(())
    }

    fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UploadManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Dequeues batches and starts one worker per batch until shutdown.
async fn intake_loop(
    ctx: Arc<WorkerContext>,
    mut rx: mpsc::Receiver<Batch>,
    shutdown: CancellationToken,
) {
    let mut workers = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = joined {
                    warn!("batch worker task failed: {e}");
                }
            }
            next = rx.recv() => {
                let Some(batch) = next else { break };
                let id = batch.id().clone();
                let cancel = shutdown.child_token();
                {
                    let mut work = ctx.work.lock().unwrap_or_else(PoisonError::into_inner);
                    if work.contains_key(&id) {
                        debug!(batch = %id, "batch already running, skipping");
                        continue;
                    }
                    work.insert(id.clone(), cancel.clone());
                }
                debug!(batch = %id, "starting batch worker");
                workers.spawn(run_batch(Arc::clone(&ctx), batch, cancel));
            }
        }
    }

    debug!(workers = workers.len(), "intake loop draining workers");
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!("batch worker task failed: {e}");
        }
    }
}
