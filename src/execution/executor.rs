//! Query executor
//!
//! Runs accepted SQL against the database on a fresh connection under a
//! fixed timeout. The connection is released on every outcome: closed after
//! success, dropped after an error, and dropped with the cancelled future
//! when the timeout fires.

use crate::error::{Result, Text2SqlError};
use crate::execution::engine::Connector;
use crate::execution::result::ResultSet;
use crate::sql::AcceptedSql;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct QueryExecutor {
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute the statement exactly as accepted. Only validated text can
    /// reach this point.
    pub async fn execute(&self, sql: &AcceptedSql) -> Result<ResultSet> {
        let started = Instant::now();
        debug!(backend = self.connector.name(), "executing query");

        let outcome = tokio::time::timeout(self.timeout, self.run(sql.as_str())).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                info!(rows = result.len(), elapsed_ms, "query executed");
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(elapsed_ms, "query failed: {}", e);
                Err(e)
            }
            Err(_) => {
                warn!(elapsed_ms, "query exceeded {}s timeout", self.timeout.as_secs_f64());
                Err(Text2SqlError::Execution(format!(
                    "query timed out after {}s",
                    self.timeout.as_secs_f64()
                )))
            }
        }
    }

    async fn run(&self, sql: &str) -> Result<ResultSet> {
        let mut conn = self.connector.connect().await?;
        let result = conn.fetch_all(sql).await?;
        if let Err(e) = conn.close().await {
            // Rows are already in hand; a failed goodbye only loses the socket.
            warn!("failed to close connection cleanly: {}", e);
        }
        Ok(result)
    }
}
