//! Background worker that runs sync requests one after another.
//!
//! Requests arrive over a flume channel. Fire-and-forget requests that pile up
//! while a sync runs are merged into one, since a single sync catches up with every
//! change since the last one.

use crate::retrieval::indexing_engine::IndexingEngine;
use crate::types::{SyncRequest, SyncSummary};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

struct SyncJob {
    request: SyncRequest,
    reply: Option<oneshot::Sender<Result<SyncSummary>>>,
}

/// Owns the worker task. Dropping every [`SyncHandle`] and calling
/// [`SyncWorker::shutdown`] lets queued jobs finish before the task exits.
pub struct SyncWorker {
    handle: SyncHandle,
    task: JoinHandle<()>,
}

/// Cheap, cloneable sender side of the worker.
#[derive(Clone)]
pub struct SyncHandle {
    tx: flume::Sender<SyncJob>,
    engine: Arc<IndexingEngine>,
}

impl SyncWorker {
    pub fn spawn(engine: Arc<IndexingEngine>) -> Self {
        let (tx, rx) = flume::unbounded();
        let task = tokio::spawn(Self::run(rx, engine.clone()));
        Self {
            handle: SyncHandle { tx, engine },
            task,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Stop accepting work from this worker's own handle and wait for the queue to drain.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.handle);
        self.task.await?;
        Ok(())
    }

    async fn run(rx: flume::Receiver<SyncJob>, engine: Arc<IndexingEngine>) {
        info!("Sync worker started");
        while let Ok(first) = rx.recv_async().await {
            let mut batch = vec![first];
            batch.extend(rx.try_iter());

            for job in coalesce(batch) {
                let result = engine.sync(job.request).await;
                if let Err(e) = &result {
                    error!("Background sync failed: {:#}", e);
                }
                match job.reply {
                    Some(reply) => {
                        // The caller may have stopped waiting.
                        let _ = reply.send(result);
                    }
                    None => debug!("Background sync finished"),
                }
            }
        }
        info!("Sync worker stopped");
    }
}

/// Merges fire-and-forget jobs into the first of them; jobs awaiting a reply run as-is.
fn coalesce(batch: Vec<SyncJob>) -> Vec<SyncJob> {
    let mut jobs: Vec<SyncJob> = Vec::with_capacity(batch.len());
    let mut merged: Option<usize> = None;
    for job in batch {
        if job.reply.is_some() {
            jobs.push(job);
            continue;
        }
        match merged {
            Some(index) => {
                let target = &mut jobs[index].request;
                target.force |= job.request.force;
                if target.progress.is_none() {
                    target.progress = job.request.progress;
                }
            }
            None => {
                merged = Some(jobs.len());
                jobs.push(job);
            }
        }
    }
    jobs
}

impl SyncHandle {
    /// Queue a sync without waiting for it.
    pub fn request_sync(&self, request: SyncRequest) -> Result<()> {
        self.engine.mark_dirty();
        self.tx
            .send(SyncJob {
                request,
                reply: None,
            })
            .map_err(|_| anyhow!("sync worker has stopped"))
    }

    /// Queue a sync and wait for its summary.
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncSummary> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send_async(SyncJob {
                request,
                reply: Some(reply),
            })
            .await
            .map_err(|_| anyhow!("sync worker has stopped"))?;
        rx.await.map_err(|_| anyhow!("sync worker dropped the request"))?
    }
}
