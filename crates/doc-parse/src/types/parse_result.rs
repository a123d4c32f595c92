//! Parse results and their persisted projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a single format parser produces from raw bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ParserOutput {
    /// Extracted plain text (may be empty)
    pub text: String,
    /// Ratio of extracted text length to source byte length, in percent.
    /// Not clamped: low-density formats can exceed 100.
    pub parsed_percentage: f64,
    /// Human-readable caveat about the extraction
    pub parsed_comment: Option<String>,
}

impl ParserOutput {
    pub fn new(text: String, parsed_percentage: f64, parsed_comment: impl Into<String>) -> Self {
        Self {
            text,
            parsed_percentage,
            parsed_comment: Some(parsed_comment.into()),
        }
    }
}

/// Result of one orchestrated parse of a stored file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    /// Source file id
    pub file_id: Uuid,
    /// Extracted plain text
    pub text: String,
    /// MIME type used for dispatch (sniffed or defaulted)
    pub mime_type: String,
    /// Completeness heuristic, see [`ParserOutput::parsed_percentage`]
    pub parsed_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_comment: Option<String>,
}

impl ParseResult {
    pub fn from_output(file_id: Uuid, mime_type: impl Into<String>, output: ParserOutput) -> Self {
        Self {
            file_id,
            text: output.text,
            mime_type: mime_type.into(),
            parsed_percentage: output.parsed_percentage,
            parsed_comment: output.parsed_comment,
        }
    }
}

/// One row of the `parsed_files` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFileRecord {
    pub file_id: Uuid,
    pub text: String,
    pub parsed_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}
