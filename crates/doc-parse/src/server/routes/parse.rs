//! Synchronous parse and parse result endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{ParseResult, ParsedFileRecord};

/// GET /api/parse/:file_id - Parse now, nothing is persisted
pub async fn parse_now(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<ParseResult>> {
    let result = state.parse_service().parse_file(file_id).await?;
    Ok(Json(result))
}

/// GET /api/parsed/:file_id - Saved result of the last queued parse
pub async fn get_parsed(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<ParsedFileRecord>> {
    state
        .results()
        .get(&file_id)?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("No parsed result for file {}", file_id)))
}

#[derive(Debug, Serialize)]
pub struct ParsersResponse {
    pub types: Vec<String>,
    pub count: usize,
}

/// GET /api/parsers - Supported MIME types
pub async fn list_parsers(State(state): State<AppState>) -> Json<ParsersResponse> {
    let types: Vec<String> = state.registry().supported_types().into_iter().collect();
    Json(ParsersResponse {
        count: types.len(),
        types,
    })
}
