pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod pipeline;
pub mod schema_rag;
pub mod server;
pub mod sql;

pub use config::AppConfig;
pub use error::{Result, Text2SqlError};
pub use pipeline::{Pipeline, PipelineFailure, Question, QueryResponse, Stage};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber used by the binaries. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
