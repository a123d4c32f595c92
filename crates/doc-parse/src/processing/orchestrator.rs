//! Parse Orchestrator: fetch, sniff, dispatch

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::{sniff, ParserRegistry, MIME_TEXT};
use crate::providers::FileStore;
use crate::types::ParseResult;

/// Parses stored files by id. Holds no state besides its collaborators and
/// persists nothing; callers decide what to do with the result.
#[derive(Clone)]
pub struct ParseService {
    registry: Arc<ParserRegistry>,
    files: Arc<dyn FileStore>,
}

impl ParseService {
    pub fn new(registry: Arc<ParserRegistry>, files: Arc<dyn FileStore>) -> Self {
        Self { registry, files }
    }

    pub fn registry(&self) -> &Arc<ParserRegistry> {
        &self.registry
    }

    /// Fetch the file, sniff its type from content and run the matching parser
    pub async fn parse_file(&self, file_id: Uuid) -> Result<ParseResult> {
        let bytes = self
            .files
            .fetch_bytes(&file_id)
            .await?
            .ok_or(Error::FileNotFound(file_id))?;

        let mime_type = match sniff::sniff_mime(&bytes) {
            Some(mime) => mime,
            None => {
                tracing::warn!(
                    "Could not detect type of file {}, defaulting to {}",
                    file_id,
                    MIME_TEXT
                );
                MIME_TEXT
            }
        };

        let parser = self
            .registry
            .get(mime_type)
            .ok_or_else(|| Error::UnsupportedFormat(mime_type.to_string()))?;

        tracing::debug!(
            "Parsing file {} ({} bytes) as {} with {}",
            file_id,
            bytes.len(),
            mime_type,
            parser.name()
        );

        // Parsers are CPU bound; keep them off the async workers
        let output = tokio::task::spawn_blocking(move || parser.parse(&bytes))
            .await
            .map_err(|e| Error::internal(format!("Parser task failed: {}", e)))??;

        Ok(ParseResult::from_output(file_id, mime_type, output))
    }
}
