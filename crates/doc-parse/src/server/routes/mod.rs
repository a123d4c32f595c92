//! API routes for the parsing server

pub mod jobs;
pub mod parse;

use axum::{
    routing::get,
    Router,
};
use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Synchronous parse
        .route("/parse/:file_id", get(parse::parse_now))
        // Queued parsing
        .route("/parsing/enqueue/:file_id", get(jobs::enqueue))
        .route("/parsing/jobs/:file_id", get(jobs::get_job).delete(jobs::dequeue))
        .route("/parsing/stats", get(jobs::queue_stats))
        // Persisted results
        .route("/parsed/:file_id", get(parse::get_parsed))
        .route("/parsers", get(parse::list_parsers))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "doc-parse",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document parsing pipeline with a durable singleton job queue",
        "endpoints": {
            "GET /api/parse/:file_id": "Parse a stored file now and return the text",
            "GET /api/parsing/enqueue/:file_id": "Queue a background parse",
            "GET /api/parsing/jobs/:file_id": "Get job state",
            "DELETE /api/parsing/jobs/:file_id": "Remove a job that has not started",
            "GET /api/parsing/stats": "Queue statistics",
            "GET /api/parsed/:file_id": "Get the saved parse result",
            "GET /api/parsers": "List supported MIME types"
        }
    }))
}
