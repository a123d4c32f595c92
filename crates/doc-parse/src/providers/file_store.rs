//! File store provider trait for reading stored file bytes

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Source of stored file bytes, keyed by file id
///
/// Implementations:
/// - `LocalFileStore`: one file per id in a directory
/// - `InMemoryFileStore`: a concurrent map, for tests and embedding
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Fetch the bytes of a file. `Ok(None)` when the id is unknown.
    async fn fetch_bytes(&self, file_id: &Uuid) -> Result<Option<Vec<u8>>>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Files stored as `<files_dir>/<file id>`
pub struct LocalFileStore {
    files_dir: PathBuf,
}

impl LocalFileStore {
    /// Create a store over `files_dir`, creating the directory if needed
    pub fn new(files_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&files_dir)?;
        Ok(Self { files_dir })
    }

    fn file_path(&self, file_id: &Uuid) -> PathBuf {
        self.files_dir.join(file_id.to_string())
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn fetch_bytes(&self, file_id: &Uuid) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.file_path(file_id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!(
                "Failed to read file {}: {}",
                file_id, e
            ))),
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// In-memory file store
#[derive(Default)]
pub struct InMemoryFileStore {
    files: DashMap<Uuid, Vec<u8>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_id: Uuid, bytes: impl Into<Vec<u8>>) {
        self.files.insert(file_id, bytes.into());
    }

    pub fn remove(&self, file_id: &Uuid) -> bool {
        self.files.remove(file_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn fetch_bytes(&self, file_id: &Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(file_id).map(|entry| entry.value().clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
