//! Configuration for the parsing pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Env var holding the path of a TOML config file
pub const CONFIG_PATH_ENV: &str = "DOC_PARSE_CONFIG";

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database and file store locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Job queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Execution bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl PipelineConfig {
    /// Read a TOML config file. Missing sections fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse a TOML document
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `DOC_PARSE_CONFIG` (if set) and apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("DOC_PARSE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DOC_PARSE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid DOC_PARSE_PORT '{}': {}", port, e)))?;
        }
        if let Ok(path) = std::env::var("DOC_PARSE_DATABASE") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("DOC_PARSE_FILES_DIR") {
            self.storage.files_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue.name.trim().is_empty() {
            return Err(Error::Config("queue.name must not be empty".to_string()));
        }
        if self.queue.batch_size == 0 {
            return Err(Error::Config("queue.batch_size must be at least 1".to_string()));
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&self.queue.retention_days) {
            return Err(Error::Config(format!(
                "queue.retention_days must be between 0 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.bridge.parse_timeout_secs) {
            return Err(Error::Config(format!(
                "bridge.parse_timeout_secs must be between 1 and {}",
                MAX_TIMEOUT_SECS
            )));
        }
        if self.bridge.reply_grace_secs > MAX_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "bridge.reply_grace_secs must be at most {}",
                MAX_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}

/// About a century; keeps the purge cutoff within chrono's range
const MAX_RETENTION_DAYS: i64 = 36_500;

/// One week
const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding parsed files and the job queue
    pub database_path: PathBuf,
    /// Directory read by the local file store (one file per file id)
    pub files_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")))
            .join("doc-parse");

        Self {
            database_path: base.join("pipeline.db"),
            files_dir: base.join("files"),
        }
    }
}

/// Job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name (the durable queue resource)
    #[serde(default = "default_queue_name")]
    pub name: String,
    /// Jobs claimed per worker pull
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Idle poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Completed/failed jobs older than this are purged at startup
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_queue_name() -> String { "parsing-queue".to_string() }
fn default_batch_size() -> usize { 1 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_retention_days() -> i64 { 7 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            retention_days: default_retention_days(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Execution bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Time limit for a single parse inside the isolated context
    #[serde(default = "default_parse_timeout")]
    pub parse_timeout_secs: u64,
    /// Extra time the coordinator waits for a reply beyond the parse timeout
    #[serde(default = "default_reply_grace")]
    pub reply_grace_secs: u64,
}

fn default_parse_timeout() -> u64 { 120 }
fn default_reply_grace() -> u64 { 5 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            parse_timeout_secs: default_parse_timeout(),
            reply_grace_secs: default_reply_grace(),
        }
    }
}

impl BridgeConfig {
    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }

    /// How long the coordinator waits for one reply
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs.saturating_add(self.reply_grace_secs))
    }
}
