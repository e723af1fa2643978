//! Connection seams used by the executor.
//!
//! The executor never talks to a driver directly. It asks a [`Connector`]
//! for a fresh [`DbConnection`], runs one statement on it and gives it back
//! by closing or dropping it. Tests plug in fakes here.

use crate::error::Result;
use crate::execution::result::ResultSet;
use async_trait::async_trait;

/// Opens database connections. One connection per query; nothing is pooled.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Backend name for logs (e.g., "mysql")
    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<Box<dyn DbConnection>>;
}

/// A single open connection.
///
/// Dropping a connection must release it. `close` is the graceful path and
/// is used after a successful query.
#[async_trait]
pub trait DbConnection: Send {
    /// Run one statement and return every row it produced.
    async fn fetch_all(&mut self, sql: &str) -> Result<ResultSet>;

    async fn close(self: Box<Self>) -> Result<()>;
}
