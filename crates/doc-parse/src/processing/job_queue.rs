//! Job queue for background parsing, persisted in SQLite
//!
//! One named queue with a singleton admission policy: a file id never has
//! more than one `created`/`active` job. Every operation first waits for the
//! one-time queue initialization.

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OnceCell};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::storage::{Database, JobStore};
use crate::types::{DequeueOutcome, EnqueueOutcome, JobRecord, QueueStats};

pub struct JobQueue {
    store: JobStore,
    config: QueueConfig,
    ready: OnceCell<()>,
    wake: Notify,
    worker_registered: AtomicBool,
}

impl JobQueue {
    pub fn new(db: Database, config: QueueConfig) -> Self {
        Self {
            store: JobStore::new(db),
            config,
            ready: OnceCell::new(),
            wake: Notify::new(),
            worker_registered: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Initialize the queue once: create the queue resource, fail jobs a
    /// previous process left active, and purge old finished jobs.
    pub async fn ready(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                let queue = self.name();
                if self.store.ensure_queue(queue)? {
                    tracing::info!("Created queue '{}'", queue);
                }

                let interrupted = self.store.fail_interrupted(queue)?;
                if interrupted > 0 {
                    tracing::warn!(
                        "Marked {} jobs interrupted by a previous shutdown as failed",
                        interrupted
                    );
                }

                let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
                let purged = self.store.purge_finished(queue, cutoff)?;
                if purged > 0 {
                    tracing::info!("Purged {} finished jobs older than {} days", purged, self.config.retention_days);
                }

                tracing::info!("Queue '{}' ready", queue);
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    /// Admit a parse job for `file_id` unless one is already pending
    pub async fn enqueue(&self, file_id: Uuid) -> Result<EnqueueOutcome> {
        self.ready().await?;

        let outcome = self.store.enqueue(self.name(), &file_id)?;
        match outcome {
            EnqueueOutcome::AlreadyPending => {
                tracing::debug!("Job for file {} already pending", file_id);
            }
            _ => {
                tracing::info!("Enqueued parsing job for file {} ({:?})", file_id, outcome);
                self.wake.notify_one();
            }
        }
        Ok(outcome)
    }

    /// Remove a not-yet-running job. Active jobs are left to finish.
    pub async fn dequeue(&self, file_id: Uuid) -> Result<DequeueOutcome> {
        self.ready().await?;

        let outcome = self.store.dequeue(self.name(), &file_id)?;
        if outcome == DequeueOutcome::Active {
            tracing::info!("Job for file {} is active, not removing", file_id);
        }
        Ok(outcome)
    }

    pub async fn get_job(&self, file_id: Uuid) -> Result<Option<JobRecord>> {
        self.ready().await?;
        self.store.get(self.name(), &file_id)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.ready().await?;
        self.store.stats(self.name())
    }

    /// Start the single consumer for this queue. Each claimed job is passed to
    /// `handler`; `Ok` marks it completed, `Err` marks it failed. Failed jobs
    /// are not retried.
    pub async fn register_worker<F, Fut>(self: &Arc<Self>, handler: F) -> Result<JoinHandle<()>>
    where
        F: Fn(Uuid) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.worker_registered.swap(true, Ordering::SeqCst) {
            return Err(Error::queue(format!(
                "A worker is already registered for queue '{}'",
                self.name()
            )));
        }

        if let Err(e) = self.ready().await {
            self.worker_registered.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let queue = Arc::clone(self);
        tracing::info!(
            "Worker registered for queue '{}' (batch size {})",
            queue.name(),
            queue.config.batch_size
        );

        Ok(tokio::spawn(async move { queue.run_worker(handler).await }))
    }

    async fn run_worker<F, Fut>(&self, handler: F)
    where
        F: Fn(Uuid) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let poll_interval = self.config.poll_interval();

        loop {
            let jobs = match self.store.claim_next(self.name(), self.config.batch_size) {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!("Failed to claim jobs from '{}': {}", self.name(), e);
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
                continue;
            }

            for job in jobs {
                let file_id = job.file_id;
                tracing::debug!("Claimed job for file {}", file_id);

                let acked = match handler(file_id).await {
                    Ok(()) => self.store.complete(self.name(), &file_id),
                    Err(e) => {
                        tracing::error!("Parsing job for file {} failed: {}", file_id, e);
                        self.store.fail(self.name(), &file_id, &e.to_string())
                    }
                };

                if let Err(e) = acked {
                    tracing::error!("Failed to acknowledge job for file {}: {}", file_id, e);
                }
            }
        }
    }
}
