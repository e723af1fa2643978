//! Runtime configuration.
//!
//! Everything is read from environment variables; the binaries load `.env`
//! first so a local file works the same way as a deployment environment.

use crate::error::{Result, Text2SqlError};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ROW_LIMIT: u64 = 100;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Connection settings for the analytical MySQL database.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
}

impl DatabaseConfig {
    /// Values that must never show up in text returned to a caller.
    pub fn secrets(&self) -> Vec<String> {
        [&self.password, &self.user, &self.host, &self.database]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .finish()
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub index_path: PathBuf,
    pub top_k: usize,
}

/// What the pipeline does when the retriever itself fails (as opposed to
/// returning no snippets, which is always fine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalFailurePolicy {
    #[default]
    Fail,
    ProceedWithoutContext,
}

impl FromStr for RetrievalFailurePolicy {
    type Err = Text2SqlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" | "fatal" => Ok(Self::Fail),
            "proceed" | "continue" => Ok(Self::ProceedWithoutContext),
            other => Err(Text2SqlError::Config(format!(
                "RETRIEVAL_ON_FAILURE must be 'fail' or 'proceed', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub default_row_limit: u64,
    pub query_timeout: Duration,
    pub on_retrieval_failure: RetrievalFailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_row_limit: DEFAULT_ROW_LIMIT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            on_retrieval_failure: RetrievalFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database = DatabaseConfig {
            host: required(&get, "DB_HOST")?,
            port: parsed(&get, "DB_PORT", 3306u16)?,
            user: required(&get, "DB_USER")?,
            password: get("DB_PASSWORD").unwrap_or_default(),
            database: required(&get, "DB_NAME")?,
            charset: get("DB_CHARSET").unwrap_or_else(|| "utf8mb4".to_string()),
        };

        let llm_key = get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY"));
        let llm_base_url = get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let llm = LlmConfig {
            api_key: llm_key.clone().ok_or_else(|| {
                Text2SqlError::Config("LLM_API_KEY (or OPENAI_API_KEY) must be set".to_string())
            })?,
            base_url: llm_base_url.clone(),
            model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            temperature: parsed(&get, "LLM_TEMPERATURE", 0.0f32)?,
        };

        let embedding = EmbeddingConfig {
            api_key: get("EMBEDDING_API_KEY")
                .or(llm_key)
                .ok_or_else(|| Text2SqlError::Config("EMBEDDING_API_KEY must be set".to_string()))?,
            base_url: get("EMBEDDING_BASE_URL").unwrap_or(llm_base_url),
            model: get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        };

        let retrieval = RetrievalConfig {
            index_path: get("INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("schema_index.json")),
            top_k: parsed(&get, "RETRIEVAL_TOP_K", DEFAULT_TOP_K)?,
        };

        let pipeline = PipelineConfig {
            default_row_limit: parsed(&get, "DEFAULT_ROW_LIMIT", DEFAULT_ROW_LIMIT)?,
            query_timeout: Duration::from_secs(parsed(
                &get,
                "QUERY_TIMEOUT_SECS",
                DEFAULT_QUERY_TIMEOUT.as_secs(),
            )?),
            on_retrieval_failure: match get("RETRIEVAL_ON_FAILURE") {
                Some(v) => v.parse()?,
                None => RetrievalFailurePolicy::default(),
            },
        };

        if pipeline.default_row_limit == 0 {
            return Err(Text2SqlError::Config("DEFAULT_ROW_LIMIT must be positive".to_string()));
        }
        if pipeline.query_timeout.is_zero() {
            return Err(Text2SqlError::Config("QUERY_TIMEOUT_SECS must be positive".to_string()));
        }

        let server = ServerConfig {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
        };

        Ok(Self {
            database,
            llm,
            embedding,
            retrieval,
            pipeline,
            server,
        })
    }
}

fn required<G>(get: &G, key: &str) -> Result<String>
where
    G: Fn(&str) -> Option<String>,
{
    get(key).ok_or_else(|| Text2SqlError::Config(format!("{} must be set", key)))
}

fn parsed<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Text2SqlError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn minimal() -> HashMap<String, String> {
        env(&[
            ("DB_HOST", "db.internal"),
            ("DB_USER", "reader"),
            ("DB_PASSWORD", "s3cret"),
            ("DB_NAME", "shop"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
    }

    #[test]
    fn test_defaults() {
        let vars = minimal();
        let config = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.database.port, 3306);
        assert_eq!(config.database.charset, "utf8mb4");
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.embedding.api_key, "sk-test");
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.pipeline.default_row_limit, 100);
        assert_eq!(config.pipeline.query_timeout, Duration::from_secs(10));
        assert_eq!(config.pipeline.on_retrieval_failure, RetrievalFailurePolicy::Fail);
    }

    #[test]
    fn test_missing_host_is_config_error() {
        let mut vars = minimal();
        vars.remove("DB_HOST");
        let err = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, Text2SqlError::Config(ref m) if m.contains("DB_HOST")));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = minimal();
        vars.insert("DB_PORT".to_string(), "not-a-port".to_string());
        assert!(AppConfig::from_lookup(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_retrieval_policy_parsing() {
        let mut vars = minimal();
        vars.insert("RETRIEVAL_ON_FAILURE".to_string(), "Proceed".to_string());
        let config = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(
            config.pipeline.on_retrieval_failure,
            RetrievalFailurePolicy::ProceedWithoutContext
        );
        assert!("sometimes".parse::<RetrievalFailurePolicy>().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let vars = minimal();
        let config = AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("sk-test"));
    }
}
