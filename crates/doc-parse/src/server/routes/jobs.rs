//! Parsing job endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{DequeueOutcome, EnqueueOutcome, JobRecord, QueueStats};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub file_id: Uuid,
    pub queue: String,
    pub outcome: EnqueueOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DequeueResponse {
    pub file_id: Uuid,
    pub outcome: DequeueOutcome,
}

/// GET /api/parsing/enqueue/:file_id - Returns once the job is admitted, not parsed
pub async fn enqueue(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<EnqueueResponse>> {
    let outcome = state.manager().enqueue(file_id).await?;
    Ok(Json(EnqueueResponse {
        file_id,
        queue: state.job_queue().name().to_string(),
        outcome,
    }))
}

/// GET /api/parsing/jobs/:file_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<JobRecord>> {
    state
        .job_queue()
        .get_job(file_id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("No parsing job for file {}", file_id)))
}

/// DELETE /api/parsing/jobs/:file_id - Active jobs are left running
pub async fn dequeue(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<DequeueResponse>> {
    let outcome = state.manager().dequeue(file_id).await?;
    Ok(Json(DequeueResponse { file_id, outcome }))
}

/// GET /api/parsing/stats
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>> {
    Ok(Json(state.job_queue().stats().await?))
}
