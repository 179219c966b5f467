use std::sync::Arc;

use fbupload_client::ClientError;
use fbupload_wal::BatchId;
use tokio::sync::mpsc;
use tracing::warn;

use crate::ManagerError;

/// Notifications emitted by the upload manager.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// An item was uploaded and marked finished in the log.
    ItemFinished { batch: BatchId, path: String },
    /// An item failed; it stays pending for the next recovery pass.
    ItemFailed {
        batch: BatchId,
        path: String,
        error: Arc<ClientError>,
    },
    /// Every item finished and the batch was removed from the log.
    BatchCompleted { batch: BatchId },
    /// The worker ran out of items but some failed.
    BatchIncomplete { batch: BatchId, pending: usize },
    /// The batch was cancelled with items still pending.
    BatchCancelled { batch: BatchId, pending: usize },
    /// A failure not tied to one item (log I/O, task failure).
    GeneralError {
        batch: Option<BatchId>,
        error: Arc<ManagerError>,
    },
}

impl UploadEvent {
    /// Batch the event refers to, if any.
    pub fn batch(&self) -> Option<&BatchId> {
        match self {
            Self::ItemFinished { batch, .. }
            | Self::ItemFailed { batch, .. }
            | Self::BatchCompleted { batch }
            | Self::BatchIncomplete { batch, .. }
            | Self::BatchCancelled { batch, .. } => Some(batch),
            Self::GeneralError { batch, .. } => batch.as_ref(),
        }
    }

    /// Returns `true` for the event that ends a batch worker.
    pub fn is_batch_end(&self) -> bool {
        matches!(
            self,
            Self::BatchCompleted { .. }
                | Self::BatchIncomplete { .. }
                | Self::BatchCancelled { .. }
                | Self::GeneralError { batch: Some(_), .. }
        )
    }
}

/// Sends without blocking. The channel is unbounded, so only a dropped
/// receiver loses events.
pub(crate) fn emit(tx: &mpsc::UnboundedSender<UploadEvent>, event: UploadEvent) {
    if let Err(e) = tx.send(event) {
        warn!("failed to deliver upload event: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_end_classification() {
        let id = BatchId::from_sequence(1);
        assert!(UploadEvent::BatchCompleted { batch: id.clone() }.is_batch_end());
        assert!(
            UploadEvent::BatchCancelled {
                batch: id.clone(),
                pending: 2
            }
            .is_batch_end()
        );
        assert!(
            !UploadEvent::ItemFinished {
                batch: id.clone(),
                path: "a".into()
            }
            .is_batch_end()
        );
        assert!(
            !UploadEvent::GeneralError {
                batch: None,
                error: Arc::new(ManagerError::Stopped)
            }
            .is_batch_end()
        );
    }

    #[tokio::test]
    async fn emit_keeps_every_event_for_a_slow_reader() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = BatchId::from_sequence(7);
        for i in 0..1000 {
            emit(
                &tx,
                UploadEvent::ItemFinished {
                    batch: id.clone(),
                    path: format!("file-{i}"),
                },
            );
        }
        emit(&tx, UploadEvent::BatchCompleted { batch: id.clone() });
        drop(tx);

        let mut finished = 0;
        let mut last = None;
        while let Some(event) = rx.recv().await {
            if matches!(event, UploadEvent::ItemFinished { .. }) {
                finished += 1;
            }
            last = Some(event);
        }
        assert_eq!(finished, 1000);
        assert!(matches!(last, Some(UploadEvent::BatchCompleted { batch }) if batch == id));
    }

    #[test]
    fn emit_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit(
            &tx,
            UploadEvent::BatchCompleted {
                batch: BatchId::from_sequence(1),
            },
        );
    }
}
