//! doc-parse: document ingestion and parsing pipeline
//!
//! Detects the type of stored files from their content, extracts plain text
//! with format-specific parsers (plain text, PDF, DOCX), and runs parses either
//! synchronously or through a durable queue that admits at most one live job
//! per file. Queued parses execute on an isolated thread and their results are
//! persisted in SQLite.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use ingestion::{Parser, ParserRegistry};
pub use processing::{ExecutionBridge, JobQueue, ParseService, ParsingJobManager};
pub use providers::{FileStore, InMemoryFileStore, LocalFileStore};
pub use storage::{Database, ResultStore};
pub use types::{
    job::{DequeueOutcome, EnqueueOutcome, JobRecord, JobState, QueueStats},
    parse_result::{ParseResult, ParsedFileRecord, ParserOutput},
};
