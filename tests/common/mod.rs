//! In-memory collaborators for pipeline and server tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use text2sql::config::{PipelineConfig, RetrievalFailurePolicy};
use text2sql::execution::{Connector, DbConnection, QueryExecutor, ResultSet, Row};
use text2sql::llm::SqlGenerator;
use text2sql::schema_rag::ContextRetriever;
use text2sql::{Pipeline, Result, Text2SqlError};

pub enum FakeRetriever {
    Snippets(Vec<String>),
    Broken,
}

#[async_trait]
impl ContextRetriever for FakeRetriever {
    async fn retrieve(&self, _question: &str) -> Result<Vec<String>> {
        match self {
            FakeRetriever::Snippets(snippets) => Ok(snippets.clone()),
            FakeRetriever::Broken => Err(Text2SqlError::Retrieval(
                "vector index unavailable".to_string(),
            )),
        }
    }
}

/// Returns a canned reply and remembers every prompt it saw.
pub struct RecordingGenerator {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl SqlGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

#[derive(Clone)]
pub enum DbBehavior {
    Rows(Vec<Value>),
    Error(String),
    Slow(Duration),
}

/// Database double. Tracks connects, currently open connections and every
/// statement it was asked to run.
pub struct FakeDatabase {
    behavior: DbBehavior,
    pub connects: AtomicUsize,
    pub open: Arc<AtomicUsize>,
    pub executed: Arc<Mutex<Vec<String>>>,
}

impl FakeDatabase {
    pub fn new(behavior: DbBehavior) -> Self {
        Self {
            behavior,
            connects: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self::new(DbBehavior::Rows(rows))
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

struct FakeConnection {
    behavior: DbBehavior,
    open: Arc<AtomicUsize>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeDatabase {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn connect(&self) -> Result<Box<dyn DbConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            behavior: self.behavior.clone(),
            open: self.open.clone(),
            executed: self.executed.clone(),
        }))
    }
}

#[async_trait]
impl DbConnection for FakeConnection {
    async fn fetch_all(&mut self, sql: &str) -> Result<ResultSet> {
        self.executed.lock().unwrap().push(sql.to_string());
        match &self.behavior {
            DbBehavior::Rows(rows) => Ok(rows
                .iter()
                .filter_map(|r| r.as_object().cloned())
                .collect::<Vec<Row>>()
                .into()),
            DbBehavior::Error(message) => Err(Text2SqlError::Execution(message.clone())),
            DbBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(ResultSet::default())
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

pub fn orders_rows() -> Vec<Value> {
    vec![
        json!({"id": 1, "customer": "alice", "total": 42.5}),
        json!({"id": 2, "customer": "bob", "total": null}),
    ]
}

pub fn schema_snippets() -> Vec<String> {
    vec![
        "Table: orders\nColumns:\n- id (int)\n- customer (varchar(64))\n- total (decimal(10,2))\n"
            .to_string(),
        "Table: customers\nColumns:\n- name (varchar(64))\n".to_string(),
    ]
}

pub struct Harness {
    pub generator: Arc<RecordingGenerator>,
    pub database: Arc<FakeDatabase>,
    pub pipeline: Pipeline,
}

pub fn harness(
    retriever: FakeRetriever,
    model_reply: &str,
    database: FakeDatabase,
    timeout: Duration,
    on_retrieval_failure: RetrievalFailurePolicy,
) -> Harness {
    let generator = Arc::new(RecordingGenerator::new(model_reply));
    let database = Arc::new(database);
    let config = PipelineConfig {
        query_timeout: timeout,
        on_retrieval_failure,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(
        Arc::new(retriever),
        generator.clone(),
        QueryExecutor::new(database.clone(), timeout),
        config,
    );
    Harness {
        generator,
        database,
        pipeline,
    }
}

/// Snippets, a fast database and the default failure policy.
pub fn simple_harness(model_reply: &str, database: FakeDatabase) -> Harness {
    harness(
        FakeRetriever::Snippets(schema_snippets()),
        model_reply,
        database,
        Duration::from_secs(5),
        RetrievalFailurePolicy::Fail,
    )
}
