//! Build the schema index the retriever searches.
//!
//! Reads every table of the configured MySQL database, embeds one text block
//! per table and writes the vector store to `INDEX_PATH`.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use text2sql::execution::MySqlConnector;
use text2sql::schema_rag::indexer::DEFAULT_SAMPLE_ROWS;
use text2sql::schema_rag::{OpenAiEmbedder, SchemaIndexer};
use text2sql::AppConfig;
use tracing::info;

#[derive(Parser)]
#[command(name = "index_schema")]
#[command(about = "Index the MySQL schema for question retrieval")]
struct Args {
    /// Output file (overrides INDEX_PATH)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sample rows stored per table
    #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
    sample_rows: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    text2sql::init_tracing();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let output = args.output.unwrap_or_else(|| config.retrieval.index_path.clone());

    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let indexer = SchemaIndexer::new(MySqlConnector::new(&config.database), embedder)
        .with_sample_rows(args.sample_rows);

    let store = indexer.build_index().await?;
    store.save(&output)?;

    info!(
        tables = store.len(),
        dimension = store.dimension(),
        "schema indexed into {}",
        output.display()
    );

    Ok(())
}
