//! Application state for the parsing server

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingestion::ParserRegistry;
use crate::processing::{JobQueue, ParseService, ParsingJobManager};
use crate::providers::{FileStore, LocalFileStore};
use crate::storage::{Database, ResultStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: PipelineConfig,
    /// Parsers by MIME type, built once at startup
    registry: Arc<ParserRegistry>,
    /// Synchronous parse path
    parse_service: ParseService,
    /// Durable job queue
    job_queue: Arc<JobQueue>,
    /// Persisted parse results
    results: ResultStore,
    /// Queue worker + execution bridge
    manager: ParsingJobManager,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Open the database and local file store named in `config`
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        tracing::info!("Initializing parsing pipeline state...");

        let db = Database::new(&config.storage.database_path)?;
        let files = Arc::new(LocalFileStore::new(config.storage.files_dir.clone())?);
        tracing::info!("Reading files from {}", config.storage.files_dir.display());

        Self::with_components(config, db, files)
    }

    /// Assemble state from an already opened database and file store
    pub fn with_components(
        config: PipelineConfig,
        db: Database,
        files: Arc<dyn FileStore>,
    ) -> Result<Self> {
        let registry = Arc::new(ParserRegistry::with_builtin());
        tracing::info!(
            "Registered {} parsers: {:?}",
            registry.len(),
            registry.supported_types()
        );

        let parse_service = ParseService::new(Arc::clone(&registry), files);
        let job_queue = Arc::new(JobQueue::new(db.clone(), config.queue.clone()));
        let results = ResultStore::new(db);
        let manager = ParsingJobManager::new(
            Arc::clone(&job_queue),
            results.clone(),
            parse_service.clone(),
            config.bridge.clone(),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                registry,
                parse_service,
                job_queue,
                results,
                manager,
                ready: RwLock::new(false),
            }),
        })
    }

    /// Initialize the queue, start the execution bridge and the worker,
    /// then mark the state ready
    pub async fn start_processing(&self) -> Result<()> {
        self.inner.job_queue.ready().await?;
        self.inner.manager.start().await?;
        self.set_ready(true);
        tracing::info!("Background parsing started");
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ParserRegistry> {
        &self.inner.registry
    }

    pub fn parse_service(&self) -> &ParseService {
        &self.inner.parse_service
    }

    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.inner.job_queue
    }

    pub fn results(&self) -> &ResultStore {
        &self.inner.results
    }

    pub fn manager(&self) -> &ParsingJobManager {
        &self.inner.manager
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read() && self.inner.manager.is_running()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
