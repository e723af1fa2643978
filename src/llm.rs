//! SQL generation through a chat-completions language model.

use crate::config::LlmConfig;
use crate::error::{Result, Text2SqlError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything that turns a prompt into raw model text. The pipeline only sees
/// this trait; the output is untrusted until cleaned and validated.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the generation prompt. Context snippets are joined with a blank
/// line in retrieval order.
pub fn build_prompt(context: &[String], question: &str, row_limit: u64) -> String {
    format!(
        r#"
You are a MySQL expert. Generate a SINGLE READ-ONLY SELECT query.
Rules:
- Only use tables from the context.
- No INSERT, UPDATE, DELETE, DROP, CREATE.
- Always include LIMIT {}.
- Return ONLY the SQL, no markdown.

Context:
{}

Question:
{}
"#,
        row_limit,
        context.join("\n\n"),
        question
    )
}

pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Text2SqlError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Text2SqlError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Text2SqlError::Llm(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| Text2SqlError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = extract_content(&response_json)?;
        debug!(model = %self.model, chars = content.len(), "llm responded");
        Ok(content)
    }
}

#[async_trait]
impl SqlGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.call_llm(prompt).await
    }
}

fn extract_content(response: &Value) -> Result<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Text2SqlError::Llm("No content in LLM response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_carries_context_in_order() {
        let context = vec![
            "Table: orders\nColumns:\n- id (int)".to_string(),
            "Table: customers\nColumns:\n- id (int)".to_string(),
        ];
        let prompt = build_prompt(&context, "How many orders?", 100);

        let orders = prompt.find("Table: orders").unwrap();
        let customers = prompt.find("Table: customers").unwrap();
        assert!(orders < customers);
        assert!(prompt.contains("- id (int)\n\nTable: customers"));
        assert!(prompt.contains("Question:\nHow many orders?"));
        assert!(prompt.contains("Always include LIMIT 100."));
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = build_prompt(&[], "list tables", 25);
        assert!(prompt.contains("Context:\n\n\nQuestion:"));
        assert!(prompt.contains("LIMIT 25"));
    }

    #[test]
    fn test_extract_content() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "  SELECT 1  "}}]
        });
        assert_eq!(extract_content(&response).unwrap(), "SELECT 1");
        assert!(extract_content(&json!({"choices": []})).is_err());
    }
}
