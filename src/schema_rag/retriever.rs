//! Schema RAG Retriever
//!
//! Finds the schema documents most relevant to a question.

use crate::error::{Result, Text2SqlError};
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::InMemoryVectorStore;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of schema context for a question. Snippets come back most
/// relevant first; an empty list is a valid answer.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, question: &str) -> Result<Vec<String>>;
}

/// Embeds the question and runs a similarity search over the schema index.
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    store: InMemoryVectorStore,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: InMemoryVectorStore, top_k: usize) -> Self {
        if let Some(indexed_with) = store.model() {
            if indexed_with != embedder.model() {
                warn!(
                    "schema index was built with {} but questions are embedded with {}",
                    indexed_with,
                    embedder.model()
                );
            }
        }
        Self {
            embedder,
            store,
            top_k,
        }
    }

    pub fn from_index_file(
        embedder: Arc<dyn Embedder>,
        path: impl AsRef<Path>,
        top_k: usize,
    ) -> Result<Self> {
        let store = InMemoryVectorStore::load(path)?;
        Ok(Self::new(embedder, store, top_k))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl ContextRetriever for VectorRetriever {
    async fn retrieve(&self, question: &str) -> Result<Vec<String>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }

        let query = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| Text2SqlError::Retrieval(e.to_string()))?;
        let hits = self
            .store
            .search(&query, self.top_k)
            .map_err(|e| Text2SqlError::Retrieval(e.to_string()))?;

        debug!(
            hits = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or_default(),
            "schema retrieval done"
        );
        Ok(hits.into_iter().map(|h| h.document.text.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_rag::vector_store::{Document, Embedding};

    /// One dimension per keyword; counts occurrences.
    struct KeywordEmbedder;

    const KEYWORDS: [&str; 3] = ["order", "customer", "product"];

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model(&self) -> &str {
            "keywords"
        }

        async fn embed(&self, text: &str) -> Result<Embedding> {
            let lower = text.to_lowercase();
            Ok(KEYWORDS
                .iter()
                .map(|k| lower.matches(k).count() as f32)
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model(&self) -> &str {
            "broken"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Err(Text2SqlError::Embedding("connection refused".to_string()))
        }
    }

    async fn store_for(texts: &[&str]) -> InMemoryVectorStore {
        let mut store = InMemoryVectorStore::new(KEYWORDS.len()).with_model("keywords");
        for (i, text) in texts.iter().enumerate() {
            store
                .add_document(Document {
                    id: format!("doc{}", i),
                    text: text.to_string(),
                    embedding: KeywordEmbedder.embed(text).await.unwrap(),
                })
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_returns_most_relevant_first() {
        let store = store_for(&[
            "Table: customers\nColumns:\n- customer_id (int)",
            "Table: orders\nColumns:\n- order_id (int)\n- order_date (date)",
            "Table: products\nColumns:\n- product_id (int)",
        ])
        .await;
        let retriever = VectorRetriever::new(Arc::new(KeywordEmbedder), store, 2);

        let snippets = retriever.retrieve("how many orders were placed?").await.unwrap();

        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].starts_with("Table: orders"));
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let retriever =
            VectorRetriever::new(Arc::new(BrokenEmbedder), InMemoryVectorStore::new(3), 8);
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retrieval_error() {
        let store = store_for(&["Table: orders"]).await;
        let retriever = VectorRetriever::new(Arc::new(BrokenEmbedder), store, 8);

        let err = retriever.retrieve("orders?").await.unwrap_err();
        assert!(matches!(err, Text2SqlError::Retrieval(_)));
    }
}
