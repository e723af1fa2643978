//! HTTP server for the question-to-SQL API

use anyhow::Result;
use std::sync::Arc;
use text2sql::{server, AppConfig, Pipeline};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    text2sql::init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        database = %config.database.database,
        model = %config.llm.model,
        row_limit = config.pipeline.default_row_limit,
        timeout_secs = config.pipeline.query_timeout.as_secs(),
        "configuration loaded"
    );

    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    let app = server::router(pipeline);

    let listener = TcpListener::bind(&config.server.bind_addr).await?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
