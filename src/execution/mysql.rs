//! MySQL backend using sqlx
//!
//! Each query gets its own connection, opened with the configured
//! credentials and charset. Driver errors are turned into short messages
//! that never carry credentials or the database address.

use crate::config::DatabaseConfig;
use crate::error::{Result, Text2SqlError};
use crate::execution::engine::{Connector, DbConnection};
use crate::execution::result::{ResultSet, Row};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::types::Json;
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};
use tracing::warn;

/// SQLSTATE for access denied
const SQLSTATE_ACCESS_DENIED: &str = "28000";

lazy_static! {
    /// `'user'@'host'` as MySQL prints it in access errors.
    static ref ACCOUNT_PATTERN: Regex = Regex::new(r"'[^']*'@'[^']*'").unwrap();
}

pub struct MySqlConnector {
    options: MySqlConnectOptions,
    secrets: Vec<String>,
}

impl MySqlConnector {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .charset(&config.charset);

        Self {
            options,
            secrets: config.secrets(),
        }
    }

    /// Open a raw driver connection. Used by the schema indexer, which needs
    /// parameterized introspection queries.
    pub async fn open(&self) -> Result<MySqlConnection> {
        self.options.connect().await.map_err(|e| {
            let message = describe_error(&e, &self.secrets);
            warn!("mysql connect failed: {}", message);
            Text2SqlError::Database(message)
        })
    }

    pub(crate) fn sanitize(&self, err: &sqlx::Error) -> String {
        describe_error(err, &self.secrets)
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self) -> Result<Box<dyn DbConnection>> {
        let conn = self.options.connect().await.map_err(|e| {
            Text2SqlError::Execution(describe_error(&e, &self.secrets))
        })?;
        Ok(Box::new(MySqlSession {
            conn,
            secrets: self.secrets.clone(),
        }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
    secrets: Vec<String>,
}

#[async_trait]
impl DbConnection for MySqlSession {
    async fn fetch_all(&mut self, sql: &str) -> Result<ResultSet> {
        let rows = sqlx::query(sql)
            .persistent(false)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| Text2SqlError::Execution(describe_error(&e, &self.secrets)))?;

        Ok(rows.iter().map(row_to_json).collect::<Vec<_>>().into())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let secrets = self.secrets;
        self.conn
            .close()
            .await
            .map_err(|e| Text2SqlError::Execution(describe_error(&e, &secrets)))
    }
}

/// Convert a driver row into a JSON object keyed by column name.
pub(crate) fn row_to_json(row: &MySqlRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(idx).map(|raw| raw.is_null()).unwrap_or(true);
        let value = if is_null {
            Value::Null
        } else {
            decode_value(row, idx, column.type_info().name())
        };
        out.insert(column.name().to_string(), value);
    }
    out
}

fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    let type_name = type_name.to_ascii_uppercase();
    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(idx).ok().map(Value::from),
        "FLOAT" | "DOUBLE" => row.try_get::<f64, _>(idx).ok().map(Value::from),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .map(|d| Value::String(d.to_string())),
        "DATETIME" => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .map(|d| Value::String(d.to_string())),
        "TIMESTAMP" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .map(|d| Value::String(d.to_rfc3339())),
        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .map(|t| Value::String(t.to_string())),
        "JSON" => row.try_get::<Json<Value>, _>(idx).ok().map(|j| j.0),
        // DECIMAL travels as text; keep every digit.
        "DECIMAL" => None,
        t if t.contains("INT") => row
            .try_get::<i64, _>(idx)
            .ok()
            .map(Value::from)
            .or_else(|| row.try_get::<u64, _>(idx).ok().map(Value::from)),
        t if t.contains("BLOB") || t.contains("BINARY") => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        _ => row.try_get::<String, _>(idx).ok().map(Value::String),
    };

    decoded
        .or_else(|| row.try_get_unchecked::<String, _>(idx).ok().map(Value::String))
        .unwrap_or(Value::Null)
}

/// Short, caller-safe description of a driver error.
pub(crate) fn describe_error(err: &sqlx::Error, secrets: &[String]) -> String {
    let message = match err {
        sqlx::Error::Database(db) => {
            let denied = db.code().as_deref() == Some(SQLSTATE_ACCESS_DENIED)
                || db.message().to_ascii_lowercase().contains("access denied");
            if denied {
                "database access denied".to_string()
            } else {
                format!("database rejected the query: {}", db.message())
            }
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => "could not reach the database".to_string(),
        sqlx::Error::Configuration(_) => "database connection is misconfigured".to_string(),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            "database connection unavailable".to_string()
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            "could not decode query results".to_string()
        }
        sqlx::Error::Protocol(_) => "database protocol error".to_string(),
        _ => "database error".to_string(),
    };
    scrub(&message, secrets)
}

/// Remove account references and configured secrets from a message.
/// Secrets only match as whole words, so a short user name does not eat
/// into ordinary words around it.
pub(crate) fn scrub(message: &str, secrets: &[String]) -> String {
    let mut out = ACCOUNT_PATTERN.replace_all(message, "[redacted]").into_owned();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        out = match secret_pattern(secret) {
            Ok(pattern) => pattern.replace_all(&out, "[redacted]").into_owned(),
            Err(_) => out.replace(secret.as_str(), "[redacted]"),
        };
    }
    out
}

/// `\b` only anchors between a word and a non-word character, so it is
/// added on a side only when the secret has a word character there.
fn secret_pattern(secret: &str) -> std::result::Result<Regex, regex::Error> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let start = if secret.starts_with(is_word) { r"\b" } else { "" };
    let end = if secret.ends_with(is_word) { r"\b" } else { "" };
    Regex::new(&format!("{}{}{}", start, regex::escape(secret), end))
}
