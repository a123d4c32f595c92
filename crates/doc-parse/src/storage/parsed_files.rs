//! Result Store: persisted parse results, one live row per file

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::database::{parse_optional_timestamp, parse_timestamp, timestamp, uuid_column, Database};
use crate::error::{Error, Result};
use crate::types::{ParseResult, ParsedFileRecord};

const SELECT_COLUMNS: &str = "file_id, text, parsed_percentage, parsed_comment, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct ResultStore {
    db: Database,
}

impl ResultStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert by file id. A re-save overwrites text, percentage and comment,
    /// bumps `updated_at`, and revives a soft-deleted row.
    pub fn save(&self, result: &ParseResult) -> Result<ParsedFileRecord> {
        let conn = self.db.conn();
        let now = timestamp(Utc::now());
        let file_id = result.file_id.to_string();

        conn.execute(
            r#"
            INSERT INTO parsed_files (
                file_id, text, parsed_percentage, parsed_comment, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, NULL)
            ON CONFLICT(file_id) DO UPDATE SET
                text = excluded.text,
                parsed_percentage = excluded.parsed_percentage,
                parsed_comment = excluded.parsed_comment,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
            params![
                file_id,
                result.text,
                result.parsed_percentage,
                result.parsed_comment,
                now,
            ],
        ).map_err(|e| Error::storage(format!("Failed to save parsed file {}: {}", result.file_id, e)))?;

        let record = conn
            .query_row(
                &format!("SELECT {} FROM parsed_files WHERE file_id = ?1", SELECT_COLUMNS),
                params![file_id],
                row_to_parsed_file,
            )
            .map_err(|e| Error::storage(format!("Failed to read back parsed file {}: {}", result.file_id, e)))?;

        tracing::debug!("Saved parsed file {} ({} chars)", result.file_id, result.text.len());
        Ok(record)
    }

    /// Live record for a file, `None` if absent or soft-deleted
    pub fn get(&self, file_id: &Uuid) -> Result<Option<ParsedFileRecord>> {
        let conn = self.db.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM parsed_files WHERE file_id = ?1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        )).map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let record = stmt.query_row(params![file_id.to_string()], row_to_parsed_file)
            .optional()
            .map_err(|e| Error::storage(format!("Failed to get parsed file {}: {}", file_id, e)))?;

        Ok(record)
    }

    /// Mark a live record deleted. Returns false if there was none.
    pub fn soft_delete(&self, file_id: &Uuid) -> Result<bool> {
        let conn = self.db.conn();
        let now = timestamp(Utc::now());

        let rows = conn.execute(
            "UPDATE parsed_files SET deleted_at = ?2, updated_at = ?2 WHERE file_id = ?1 AND deleted_at IS NULL",
            params![file_id.to_string(), now],
        ).map_err(|e| Error::storage(format!("Failed to delete parsed file {}: {}", file_id, e)))?;

        Ok(rows > 0)
    }
}

fn row_to_parsed_file(row: &rusqlite::Row) -> rusqlite::Result<ParsedFileRecord> {
    let file_id = uuid_column(row, 0)?;
    let text: String = row.get(1)?;
    let parsed_percentage: Option<f64> = row.get(2)?;
    let parsed_comment: Option<String> = row.get(3)?;
    let created_at_str: String = row.get(4)?;
    let updated_at_str: String = row.get(5)?;
    let deleted_at_str: Option<String> = row.get(6)?;

    Ok(ParsedFileRecord {
        file_id,
        text,
        parsed_percentage,
        parsed_comment,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
        deleted_at: parse_optional_timestamp(deleted_at_str),
    })
}
