//! Durable queue persistence
//!
//! A job row is keyed by (queue, file id). At most one row exists per key, so
//! the singleton rule reduces to: only replace a row whose state is terminal.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use uuid::Uuid;

use super::database::{parse_optional_timestamp, parse_timestamp, timestamp, uuid_column, Database};
use crate::error::{Error, Result};
use crate::types::{DequeueOutcome, EnqueueOutcome, JobRecord, JobState, QueueStats};

/// Admission policy recorded for every queue
pub const QUEUE_POLICY: &str = "singleton";

const SELECT_COLUMNS: &str =
    "queue, file_id, state, error, created_at, started_at, completed_at, updated_at";

fn queue_err(context: &str, e: rusqlite::Error) -> Error {
    Error::queue(format!("{}: {}", context, e))
}

#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the named queue resource if it does not exist yet
    pub fn ensure_queue(&self, queue: &str) -> Result<bool> {
        let conn = self.db.conn();
        let rows = conn.execute(
            "INSERT OR IGNORE INTO queues (name, policy, created_at) VALUES (?1, ?2, ?3)",
            params![queue, QUEUE_POLICY, timestamp(Utc::now())],
        ).map_err(|e| queue_err("Failed to create queue", e))?;

        Ok(rows > 0)
    }

    /// Policy recorded for a queue
    pub fn queue_policy(&self, queue: &str) -> Result<Option<String>> {
        let conn = self.db.conn();
        conn.query_row(
            "SELECT policy FROM queues WHERE name = ?1",
            params![queue],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| queue_err("Failed to read queue", e))
    }

    pub fn enqueue(&self, queue: &str, file_id: &Uuid) -> Result<EnqueueOutcome> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()
            .map_err(|e| queue_err("Failed to begin transaction", e))?;

        let existing = current_state(&tx, queue, file_id)?;
        let outcome = match existing {
            Some(state) if state.is_live() => EnqueueOutcome::AlreadyPending,
            Some(_) => {
                tx.execute(
                    "DELETE FROM parse_jobs WHERE queue = ?1 AND file_id = ?2",
                    params![queue, file_id.to_string()],
                ).map_err(|e| queue_err("Failed to replace job", e))?;
                insert_job(&tx, queue, file_id)?;
                EnqueueOutcome::Replaced
            }
            None => {
                insert_job(&tx, queue, file_id)?;
                EnqueueOutcome::Created
            }
        };

        tx.commit()
            .map_err(|e| queue_err("Failed to commit transaction", e))?;
        Ok(outcome)
    }

    /// Remove a job unless it is executing
    pub fn dequeue(&self, queue: &str, file_id: &Uuid) -> Result<DequeueOutcome> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()
            .map_err(|e| queue_err("Failed to begin transaction", e))?;

        let outcome = match current_state(&tx, queue, file_id)? {
            None => DequeueOutcome::NotFound,
            Some(JobState::Active) => DequeueOutcome::Active,
            Some(_) => {
                tx.execute(
                    "DELETE FROM parse_jobs WHERE queue = ?1 AND file_id = ?2",
                    params![queue, file_id.to_string()],
                ).map_err(|e| queue_err("Failed to remove job", e))?;
                DequeueOutcome::Removed
            }
        };

        tx.commit()
            .map_err(|e| queue_err("Failed to commit transaction", e))?;
        Ok(outcome)
    }

    pub fn get(&self, queue: &str, file_id: &Uuid) -> Result<Option<JobRecord>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM parse_jobs WHERE queue = ?1 AND file_id = ?2",
            SELECT_COLUMNS
        )).map_err(|e| queue_err("Failed to prepare query", e))?;

        stmt.query_row(params![queue, file_id.to_string()], row_to_job_record)
            .optional()
            .map_err(|e| queue_err("Failed to get job", e))
    }

    /// Move up to `limit` of the oldest `created` jobs to `active`
    pub fn claim_next(&self, queue: &str, limit: usize) -> Result<Vec<JobRecord>> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()
            .map_err(|e| queue_err("Failed to begin transaction", e))?;
        let now = timestamp(Utc::now());

        let file_ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT file_id FROM parse_jobs WHERE queue = ?1 AND state = 'created' ORDER BY created_at, rowid LIMIT ?2",
            ).map_err(|e| queue_err("Failed to prepare query", e))?;

            let ids = stmt.query_map(params![queue, limit as i64], |row| row.get(0))
                .map_err(|e| queue_err("Failed to select jobs", e))?
                .collect::<rusqlite::Result<Vec<String>>>();
            ids.map_err(|e| queue_err("Failed to read jobs", e))?
        };

        let mut claimed = Vec::with_capacity(file_ids.len());
        for file_id in &file_ids {
            tx.execute(
                "UPDATE parse_jobs SET state = 'active', started_at = ?3, updated_at = ?3 WHERE queue = ?1 AND file_id = ?2",
                params![queue, file_id, now],
            ).map_err(|e| queue_err("Failed to claim job", e))?;

            let record = tx.query_row(
                &format!("SELECT {} FROM parse_jobs WHERE queue = ?1 AND file_id = ?2", SELECT_COLUMNS),
                params![queue, file_id],
                row_to_job_record,
            ).map_err(|e| queue_err("Failed to read claimed job", e))?;
            claimed.push(record);
        }

        tx.commit()
            .map_err(|e| queue_err("Failed to commit transaction", e))?;
        Ok(claimed)
    }

    /// Acknowledge an active job as completed
    pub fn complete(&self, queue: &str, file_id: &Uuid) -> Result<bool> {
        self.finish(queue, file_id, JobState::Completed, None)
    }

    /// Acknowledge an active job as failed
    pub fn fail(&self, queue: &str, file_id: &Uuid, error: &str) -> Result<bool> {
        self.finish(queue, file_id, JobState::Failed, Some(error))
    }

    fn finish(&self, queue: &str, file_id: &Uuid, state: JobState, error: Option<&str>) -> Result<bool> {
        let conn = self.db.conn();
        let now = timestamp(Utc::now());

        let rows = conn.execute(
            "UPDATE parse_jobs SET state = ?3, error = ?4, completed_at = ?5, updated_at = ?5 WHERE queue = ?1 AND file_id = ?2 AND state = 'active'",
            params![queue, file_id.to_string(), state.as_str(), error, now],
        ).map_err(|e| queue_err("Failed to finish job", e))?;

        Ok(rows > 0)
    }

    /// Fail jobs left `active` by a previous process
    pub fn fail_interrupted(&self, queue: &str) -> Result<usize> {
        let conn = self.db.conn();
        let now = timestamp(Utc::now());

        conn.execute(
            "UPDATE parse_jobs SET state = 'failed', error = 'interrupted', completed_at = ?2, updated_at = ?2 WHERE queue = ?1 AND state = 'active'",
            params![queue, now],
        ).map_err(|e| queue_err("Failed to fail interrupted jobs", e))
    }

    /// Delete completed/failed jobs that finished before `cutoff`
    pub fn purge_finished(&self, queue: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.conn();

        conn.execute(
            "DELETE FROM parse_jobs WHERE queue = ?1 AND state IN ('completed', 'failed') AND completed_at < ?2",
            params![queue, timestamp(cutoff)],
        ).map_err(|e| queue_err("Failed to purge jobs", e))
    }

    pub fn stats(&self, queue: &str) -> Result<QueueStats> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM parse_jobs WHERE queue = ?1 GROUP BY state",
        ).map_err(|e| queue_err("Failed to prepare query", e))?;

        let counts = stmt.query_map(params![queue], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|e| queue_err("Failed to count jobs", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| queue_err("Failed to count jobs", e))?;

        let mut stats = QueueStats {
            queue: queue.to_string(),
            ..Default::default()
        };
        for (state, count) in counts {
            let count = count as usize;
            match JobState::parse(&state) {
                Some(JobState::Created) => stats.created = count,
                Some(JobState::Active) => stats.active = count,
                Some(JobState::Completed) => stats.completed = count,
                Some(JobState::Failed) => stats.failed = count,
                None => tracing::warn!("Unknown job state '{}' in queue {}", state, queue),
            }
        }

        Ok(stats)
    }
}

fn current_state(tx: &Transaction<'_>, queue: &str, file_id: &Uuid) -> Result<Option<JobState>> {
    let state: Option<String> = tx.query_row(
        "SELECT state FROM parse_jobs WHERE queue = ?1 AND file_id = ?2",
        params![queue, file_id.to_string()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| queue_err("Failed to look up job", e))?;

    match state {
        Some(state) => JobState::parse(&state)
            .map(Some)
            .ok_or_else(|| Error::queue(format!("Unknown job state '{}' for {}", state, file_id))),
        None => Ok(None),
    }
}

fn insert_job(tx: &Transaction<'_>, queue: &str, file_id: &Uuid) -> Result<()> {
    let now = timestamp(Utc::now());
    tx.execute(
        "INSERT INTO parse_jobs (queue, file_id, state, created_at, updated_at) VALUES (?1, ?2, 'created', ?3, ?3)",
        params![queue, file_id.to_string(), now],
    ).map_err(|e| queue_err("Failed to insert job", e))?;
    Ok(())
}

fn row_to_job_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
    let queue: String = row.get(0)?;
    let file_id = uuid_column(row, 1)?;
    let state_str: String = row.get(2)?;
    let error: Option<String> = row.get(3)?;
    let created_at_str: String = row.get(4)?;
    let started_at_str: Option<String> = row.get(5)?;
    let completed_at_str: Option<String> = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    let state = JobState::parse(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown job state '{}'", state_str).into(),
        )
    })?;

    Ok(JobRecord {
        queue,
        file_id,
        state,
        error,
        created_at: parse_timestamp(&created_at_str),
        started_at: parse_optional_timestamp(started_at_str),
        completed_at: parse_optional_timestamp(completed_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUE: &str = "parsing-queue";

    fn store() -> JobStore {
        let store = JobStore::new(Database::in_memory().unwrap());
        store.ensure_queue(QUEUE).unwrap();
        store
    }

    #[test]
    fn test_queue_resource() {
        let store = store();
        assert!(!store.ensure_queue(QUEUE).unwrap());
        assert_eq!(store.queue_policy(QUEUE).unwrap().as_deref(), Some(QUEUE_POLICY));
        assert_eq!(store.queue_policy("other").unwrap(), None);
    }

    #[test]
    fn test_enqueue_is_singleton() {
        let store = store();
        let file_id = Uuid::new_v4();

        assert_eq!(store.enqueue(QUEUE, &file_id).unwrap(), EnqueueOutcome::Created);
        assert_eq!(store.enqueue(QUEUE, &file_id).unwrap(), EnqueueOutcome::AlreadyPending);
        assert_eq!(store.stats(QUEUE).unwrap().created, 1);

        let claimed = store.claim_next(QUEUE, 10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].state, JobState::Active);
        assert!(claimed[0].started_at.is_some());
        assert_eq!(store.enqueue(QUEUE, &file_id).unwrap(), EnqueueOutcome::AlreadyPending);
    }

    #[test]
    fn test_terminal_job_is_replaced() {
        let store = store();
        let file_id = Uuid::new_v4();

        store.enqueue(QUEUE, &file_id).unwrap();
        store.claim_next(QUEUE, 1).unwrap();
        assert!(store.fail(QUEUE, &file_id, "boom").unwrap());
        assert_eq!(store.get(QUEUE, &file_id).unwrap().unwrap().error.as_deref(), Some("boom"));

        assert_eq!(store.enqueue(QUEUE, &file_id).unwrap(), EnqueueOutcome::Replaced);
        let job = store.get(QUEUE, &file_id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Created);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_dequeue_leaves_active_jobs() {
        let store = store();
        let pending = Uuid::new_v4();
        let running = Uuid::new_v4();

        store.enqueue(QUEUE, &running).unwrap();
        store.claim_next(QUEUE, 1).unwrap();
        store.enqueue(QUEUE, &pending).unwrap();

        assert_eq!(store.dequeue(QUEUE, &running).unwrap(), DequeueOutcome::Active);
        assert_eq!(store.dequeue(QUEUE, &pending).unwrap(), DequeueOutcome::Removed);
        assert_eq!(store.dequeue(QUEUE, &pending).unwrap(), DequeueOutcome::NotFound);
        assert!(store.get(QUEUE, &running).unwrap().is_some());
    }

    #[test]
    fn test_claim_order_and_limit() {
        let store = store();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.enqueue(QUEUE, id).unwrap();
        }

        let first = store.claim_next(QUEUE, 2).unwrap();
        assert_eq!(first.iter().map(|j| j.file_id).collect::<Vec<_>>(), ids[..2]);
        let rest = store.claim_next(QUEUE, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].file_id, ids[2]);
        assert!(store.claim_next(QUEUE, 2).unwrap().is_empty());
    }

    #[test]
    fn test_only_active_jobs_finish() {
        let store = store();
        let file_id = Uuid::new_v4();

        store.enqueue(QUEUE, &file_id).unwrap();
        assert!(!store.complete(QUEUE, &file_id).unwrap());
        store.claim_next(QUEUE, 1).unwrap();
        assert!(store.complete(QUEUE, &file_id).unwrap());

        let job = store.get(QUEUE, &file_id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_housekeeping() {
        let store = store();
        let interrupted = Uuid::new_v4();
        let done = Uuid::new_v4();

        store.enqueue(QUEUE, &done).unwrap();
        store.claim_next(QUEUE, 1).unwrap();
        store.complete(QUEUE, &done).unwrap();
        store.enqueue(QUEUE, &interrupted).unwrap();
        store.claim_next(QUEUE, 1).unwrap();

        assert_eq!(store.fail_interrupted(QUEUE).unwrap(), 1);
        let job = store.get(QUEUE, &interrupted).unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("interrupted"));

        let future = Utc::now() + chrono::Duration::days(1);
        assert_eq!(store.purge_finished(QUEUE, future).unwrap(), 2);
        assert_eq!(store.stats(QUEUE).unwrap().total(), 0);
    }
}
