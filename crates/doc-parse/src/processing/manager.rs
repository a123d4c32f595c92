//! Job manager: connects the queue worker, the execution bridge and the
//! Result Store

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{BridgeReply, ExecutionBridge, JobQueue, ParseService};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::storage::ResultStore;
use crate::types::{DequeueOutcome, EnqueueOutcome};

pub struct ParsingJobManager {
    queue: Arc<JobQueue>,
    results: ResultStore,
    service: ParseService,
    config: BridgeConfig,
    bridge: OnceCell<Arc<ExecutionBridge>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ParsingJobManager {
    pub fn new(
        queue: Arc<JobQueue>,
        results: ResultStore,
        service: ParseService,
        config: BridgeConfig,
    ) -> Self {
        Self {
            queue,
            results,
            service,
            config,
            bridge: OnceCell::new(),
            worker: Mutex::new(None),
        }
    }

    /// The execution bridge, started on first use
    async fn bridge(&self) -> Result<Arc<ExecutionBridge>> {
        let bridge = self
            .bridge
            .get_or_try_init(|| async {
                ExecutionBridge::start(self.service.clone(), &self.config)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(bridge))
    }

    /// Start the bridge and register the queue worker. Call once.
    pub async fn start(&self) -> Result<()> {
        if self.worker.lock().is_some() {
            return Err(Error::queue("Job manager already started"));
        }

        let bridge = self.bridge().await?;
        let results = self.results.clone();

        let handle = self
            .queue
            .register_worker(move |file_id| {
                let bridge = Arc::clone(&bridge);
                let results = results.clone();
                async move { process_job(&bridge, &results, file_id).await }
            })
            .await?;

        *self.worker.lock() = Some(handle);
        Ok(())
    }

    pub async fn enqueue(&self, file_id: Uuid) -> Result<EnqueueOutcome> {
        self.queue.enqueue(file_id).await
    }

    pub async fn dequeue(&self, file_id: Uuid) -> Result<DequeueOutcome> {
        self.queue.dequeue(file_id).await
    }

    /// Worker and bridge are both up
    pub fn is_running(&self) -> bool {
        let worker_alive = self
            .worker
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished());
        let bridge_alive = self.bridge.get().map_or(false, |bridge| bridge.is_running());
        worker_alive && bridge_alive
    }

    /// Stop pulling jobs. A job mid-flight is marked failed on next startup.
    pub fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            tracing::info!("Parsing worker stopped");
        }
    }
}

impl Drop for ParsingJobManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle one claimed job. `Err` marks the job failed; a failed parse leaves
/// any earlier saved result untouched.
async fn process_job(bridge: &ExecutionBridge, results: &ResultStore, file_id: Uuid) -> Result<()> {
    match bridge.parse(file_id).await? {
        BridgeReply::Success { result, .. } => {
            let record = results.save(&result)?;
            tracing::info!(
                "Parsed file {} as {}: {} characters ({:.1}%)",
                file_id,
                result.mime_type,
                record.text.chars().count(),
                result.parsed_percentage
            );
            Ok(())
        }
        BridgeReply::Error { error, .. } => Err(Error::internal(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::ingestion::ParserRegistry;
    use crate::providers::InMemoryFileStore;
    use crate::storage::Database;
    use crate::types::{JobRecord, JobState};
    use std::time::Duration;

    struct Fixture {
        files: Arc<InMemoryFileStore>,
        queue: Arc<JobQueue>,
        results: ResultStore,
        manager: ParsingJobManager,
    }

    fn fixture() -> Fixture {
        let db = Database::in_memory().unwrap();
        let files = Arc::new(InMemoryFileStore::new());
        let queue = Arc::new(JobQueue::new(
            db.clone(),
            QueueConfig {
                poll_interval_ms: 20,
                ..Default::default()
            },
        ));
        let results = ResultStore::new(db);
        let service = ParseService::new(Arc::new(ParserRegistry::with_builtin()), files.clone());
        let manager = ParsingJobManager::new(
            queue.clone(),
            results.clone(),
            service,
            BridgeConfig::default(),
        );
        Fixture {
            files,
            queue,
            results,
            manager,
        }
    }

    async fn wait_for_finish(queue: &JobQueue, file_id: Uuid) -> JobRecord {
        for _ in 0..300 {
            if let Some(job) = queue.get_job(file_id).await.unwrap() {
                if !job.state.is_live() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job for {} did not finish", file_id);
    }

    #[tokio::test]
    async fn test_queued_parse_is_persisted() {
        let fx = fixture();
        let file_id = Uuid::new_v4();
        fx.files.insert(file_id, "queued text");

        fx.manager.start().await.unwrap();
        assert!(fx.manager.is_running());
        fx.manager.enqueue(file_id).await.unwrap();

        let job = wait_for_finish(&fx.queue, file_id).await;
        assert_eq!(job.state, JobState::Completed);
        let record = fx.results.get(&file_id).unwrap().unwrap();
        assert_eq!(record.text, "queued text");
        assert_eq!(record.parsed_percentage, Some(100.0));
    }

    #[tokio::test]
    async fn test_failed_parse_keeps_previous_record() {
        let fx = fixture();
        let file_id = Uuid::new_v4();
        fx.files.insert(file_id, "first version");

        fx.manager.start().await.unwrap();
        fx.manager.enqueue(file_id).await.unwrap();
        wait_for_finish(&fx.queue, file_id).await;

        // the file disappears; the re-parse fails
        fx.files.remove(&file_id);
        fx.manager.enqueue(file_id).await.unwrap();
        let job = wait_for_finish(&fx.queue, file_id).await;

        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.unwrap().contains("not found"));
        assert_eq!(fx.results.get(&file_id).unwrap().unwrap().text, "first version");
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let fx = fixture();
        fx.manager.start().await.unwrap();
        assert!(fx.manager.start().await.is_err());
        fx.manager.shutdown();
        assert!(!fx.manager.is_running());
    }
}
