use thiserror::Error;

#[derive(Error, Debug)]
pub enum Text2SqlError {
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Could not generate valid SQL")]
    GenerationEmpty,

    #[error("Unsafe SQL: {0}")]
    ValidationRejected(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Text2SqlError>;
