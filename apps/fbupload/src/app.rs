//! Wires the session, write-ahead log and upload manager together.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fbupload_client::{ResourceCache, Session};
use fbupload_manager::{ManagerError, SessionUploader, UploadEvent, UploadManager};
use fbupload_wal::{Store, WriteAheadLog};
use tracing::{error, info, warn};

use crate::Command;
use crate::config::Config;

/// Runs one command to completion.
pub async fn run(config: Config, command: Command) -> anyhow::Result<()> {
    let session = Session::login(&config.host, &config.username, &config.password)
        .await
        .with_context(|| format!("logging into {}", config.host))?
        .with_metadata_timeout(Duration::from_secs(config.metadata_timeout_secs));
    let session = Arc::new(session);
    info!(host = %config.host, user = %config.username, "logged in");

    match command {
        Command::Upload { dest, files } => {
            let files = absolute_paths(&files)?;
            upload(&config, session, Some((dest, files))).await
        }
        Command::Resume => upload(&config, session, None).await,
        Command::Ls { paths } => list(session, &paths).await,
        Command::Checksum { path } => {
            println!("{}  {}", session.sha256(&path).await?, path);
            Ok(())
        }
    }
}

/// Recovers pending batches, optionally queues a new one, and waits until
/// every batch of this run ends or the user interrupts.
async fn upload(
    config: &Config,
    session: Arc<Session>,
    batch: Option<(String, Vec<PathBuf>)>,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let wal = WriteAheadLog::new(Store::open(config.wal_path())?)?;

    let uploader = Arc::new(SessionUploader::new(session, config.upload_options()));
    let manager = UploadManager::new(wal, uploader, config.manager.clone());
    let mut events = manager
        .take_events()
        .await
        .context("upload event receiver already taken")?;

    let mut waiting: HashSet<_> = manager.start().await?.into_iter().collect();
    if !waiting.is_empty() {
        info!(batches = waiting.len(), "resuming batches from an earlier run");
    }
    if let Some((dest, files)) = batch {
        let id = manager.begin_upload(&dest, &files).await?;
        info!(batch = %id, destination = %dest, files = files.len(), "batch queued");
        waiting.insert(id);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut failed = 0usize;
    let mut interrupted = false;
    while !waiting.is_empty() {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("SIGINT received, pending items stay queued");
                interrupted = true;
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if matches!(event, UploadEvent::ItemFailed { .. }) {
                    failed += 1;
                }
                report(&event);
                if event.is_batch_end()
                    && let Some(id) = event.batch()
                {
                    waiting.remove(id);
                }
            }
        }
    }

    manager.stop().await?;

    if interrupted {
        anyhow::bail!("interrupted; run `fbupload resume` to continue");
    }
    if failed > 0 {
        anyhow::bail!("{failed} item(s) failed; run `fbupload resume` to retry");
    }
    Ok(())
}

fn report(event: &UploadEvent) {
    match event {
        UploadEvent::ItemFinished { batch, path } => {
            info!(batch = %batch, path = %path, "uploaded");
        }
        UploadEvent::ItemFailed { batch, path, error } => {
            warn!(batch = %batch, path = %path, error = %error, "upload failed");
        }
        UploadEvent::BatchCompleted { batch } => {
            info!(batch = %batch, "batch complete");
        }
        UploadEvent::BatchIncomplete { batch, pending } => {
            warn!(batch = %batch, pending, "batch incomplete");
        }
        UploadEvent::BatchCancelled { batch, pending } => {
            info!(batch = %batch, pending, "batch cancelled");
        }
        UploadEvent::GeneralError { batch, error } => {
            let batch = batch.as_ref().map(ToString::to_string);
            if let ManagerError::Wal(wal_err) = error.as_ref()
                && wal_err.is_corruption()
            {
                error!(batch = ?batch, error = %error, "write-ahead log is inconsistent, the batch cannot be resumed");
            } else {
                error!(batch = ?batch, error = %error, "upload error");
            }
        }
    }
}

async fn list(session: Arc<Session>, paths: &[String]) -> anyhow::Result<()> {
    let cache = ResourceCache::new(session);
    for path in paths {
        let resource = cache.info(path).await?;
        if !resource.is_dir {
            println!("{:>12}  {}", resource.size, resource.path);
            continue;
        }
        println!("{}:", resource.path);
        for item in &resource.items {
            let suffix = if item.is_dir { "/" } else { "" };
            println!("{:>12}  {}{}", item.size, item.name, suffix);
        }
    }
    Ok(())
}

/// The log stores item paths, so they must survive a change of working
/// directory between runs.
fn absolute_paths(files: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    files
        .iter()
        .map(|f| std::path::absolute(f).with_context(|| format!("resolving {}", f.display())))
        .collect()
}
