//! Parsing server binary
//!
//! Run with: cargo run -p doc-parse --bin doc-parse-server

use doc_parse::{config::PipelineConfig, server::ParseServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_parse=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = PipelineConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Files: {}", config.storage.files_dir.display());
    tracing::info!("  - Queue: {} (batch size {})", config.queue.name, config.queue.batch_size);
    tracing::info!("  - Parse timeout: {}s", config.bridge.parse_timeout_secs);

    // Create and start server
    let server = ParseServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  GET    /api/parse/:file_id          - Parse a file now");
    println!("  GET    /api/parsing/enqueue/:file_id - Queue a background parse");
    println!("  GET    /api/parsed/:file_id         - Saved parse result");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
