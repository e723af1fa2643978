//! Question-to-result pipeline
//!
//! One request walks `Start -> Retrieved -> Generated -> Validated ->
//! Executed -> Done`, strictly in order. Any stage may end the run in
//! `Failed(stage)`; nothing after a failed stage runs. The executor is only
//! reachable with SQL the validator accepted.

use crate::config::{AppConfig, PipelineConfig, RetrievalFailurePolicy};
use crate::error::{Result, Text2SqlError};
use crate::execution::{MySqlConnector, QueryExecutor, ResultSet};
use crate::llm::{build_prompt, LlmClient, SqlGenerator};
use crate::schema_rag::{ContextRetriever, OpenAiEmbedder, VectorRetriever};
use crate::sql::{clean, AcceptedSql, SqlValidator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A non-blank natural-language question, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(Text2SqlError::InvalidQuestion("Question is required".to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Retrieve,
    Generate,
    Validate,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
            Stage::Validate => "validate",
            Stage::Execute => "execute",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Retrieved,
    Generated,
    Validated,
    Executed,
    Done,
    Failed(Stage),
}

/// Terminal failure of a run. Displays as the underlying error, which is
/// the message callers see.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: Text2SqlError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub sql: String,
    pub result: ResultSet,
}

pub struct Pipeline {
    retriever: Arc<dyn ContextRetriever>,
    generator: Arc<dyn SqlGenerator>,
    validator: SqlValidator,
    executor: QueryExecutor,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        retriever: Arc<dyn ContextRetriever>,
        generator: Arc<dyn SqlGenerator>,
        executor: QueryExecutor,
        config: PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            validator: SqlValidator::new(),
            executor,
            config,
        }
    }

    /// Wire the production collaborators: OpenAI-compatible embedder and
    /// model, the on-disk schema index and MySQL.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
        let retriever = VectorRetriever::from_index_file(
            embedder,
            &config.retrieval.index_path,
            config.retrieval.top_k,
        )?;
        info!(
            documents = retriever.len(),
            path = %config.retrieval.index_path.display(),
            "schema index loaded"
        );
        let generator = LlmClient::new(&config.llm)?;
        let executor = QueryExecutor::new(
            Arc::new(MySqlConnector::new(&config.database)),
            config.pipeline.query_timeout,
        );

        Ok(Self::new(
            Arc::new(retriever),
            Arc::new(generator),
            executor,
            config.pipeline.clone(),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one question through every stage.
    pub async fn run(&self, question: &Question) -> std::result::Result<QueryResponse, PipelineFailure> {
        let request_id = Uuid::new_v4();
        let span = info_span!("pipeline", %request_id);
        self.run_stages(question).instrument(span).await
    }

    async fn run_stages(
        &self,
        question: &Question,
    ) -> std::result::Result<QueryResponse, PipelineFailure> {
        let mut state = PipelineState::Start;
        info!(question = %question.as_str(), "pipeline started");

        let context = self
            .retrieve(question)
            .await
            .map_err(|e| fail(&mut state, Stage::Retrieve, e))?;
        advance(&mut state, PipelineState::Retrieved);

        let candidate = self
            .generate(question, &context)
            .await
            .map_err(|e| fail(&mut state, Stage::Generate, e))?;
        advance(&mut state, PipelineState::Generated);

        let accepted = self
            .validate(candidate)
            .map_err(|e| fail(&mut state, Stage::Validate, e))?;
        advance(&mut state, PipelineState::Validated);

        let result = self
            .executor
            .execute(&accepted)
            .await
            .map_err(|e| fail(&mut state, Stage::Execute, e))?;
        advance(&mut state, PipelineState::Executed);

        let response = QueryResponse {
            sql: accepted.into_inner(),
            result,
        };
        advance(&mut state, PipelineState::Done);
        Ok(response)
    }

    async fn retrieve(&self, question: &Question) -> Result<Vec<String>> {
        match self.retriever.retrieve(question.as_str()).await {
            Ok(snippets) => {
                debug!(snippets = snippets.len(), "context retrieved");
                Ok(snippets)
            }
            Err(e) => match self.config.on_retrieval_failure {
                RetrievalFailurePolicy::Fail => Err(match e {
                    Text2SqlError::Retrieval(_) => e,
                    other => Text2SqlError::Retrieval(other.to_string()),
                }),
                RetrievalFailurePolicy::ProceedWithoutContext => {
                    warn!("retrieval failed, continuing without context: {}", e);
                    Ok(Vec::new())
                }
            },
        }
    }

    async fn generate(&self, question: &Question, context: &[String]) -> Result<String> {
        let prompt = build_prompt(context, question.as_str(), self.config.default_row_limit);
        let raw = self.generator.generate(&prompt).await?;
        let candidate = clean(&raw, self.config.default_row_limit);
        if candidate.is_empty() {
            debug!(raw = %raw, "no SELECT in model output");
            return Err(Text2SqlError::GenerationEmpty);
        }
        debug!(sql = %candidate, "candidate generated");
        Ok(candidate)
    }

    fn validate(&self, candidate: String) -> Result<AcceptedSql> {
        self.validator
            .accept(candidate)
            .map_err(Text2SqlError::ValidationRejected)
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug!("{:?} -> {:?}", state, next);
    *state = next;
}

fn fail(state: &mut PipelineState, stage: Stage, error: Text2SqlError) -> PipelineFailure {
    warn!(%stage, "{:?} -> Failed: {}", state, error);
    *state = PipelineState::Failed(stage);
    PipelineFailure { stage, error }
}
