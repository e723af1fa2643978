//! Query execution against the analytical database

pub mod engine;
pub mod executor;
pub mod mysql;
pub mod result;

pub use engine::{Connector, DbConnection};
pub use executor::QueryExecutor;
pub use mysql::MySqlConnector;
pub use result::{ResultSet, Row};
