//! Vector Store
//!
//! In-memory store of schema documents with brute-force cosine search.
//! Schemas have tens to hundreds of tables, so a linear scan is plenty. The
//! whole store persists as one JSON file written by the indexer.

use crate::error::{Result, Text2SqlError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

/// Document in the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub embedding: Embedding,
}

/// Search result from vector store
#[derive(Debug, Clone)]
pub struct SearchResult<'a> {
    pub document: &'a Document,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryVectorStore {
    /// Embedding model the documents were indexed with
    #[serde(default)]
    model: Option<String>,
    dimension: usize,
    documents: Vec<Document>,
}

impl InMemoryVectorStore {
    /// Create a new vector store with specified embedding dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            model: None,
            dimension,
            documents: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add a document. A store created with dimension 0 adopts the dimension
    /// of its first document.
    pub fn add_document(&mut self, document: Document) -> Result<()> {
        if self.dimension == 0 && self.documents.is_empty() {
            self.dimension = document.embedding.len();
        }
        if document.embedding.len() != self.dimension {
            return Err(Text2SqlError::Embedding(format!(
                "Embedding dimension {} doesn't match store dimension {} (document {})",
                document.embedding.len(),
                self.dimension,
                document.id
            )));
        }
        self.documents.push(document);
        Ok(())
    }

    /// Top `top_k` documents by cosine similarity, best first. Equal scores
    /// keep insertion order.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult<'_>>> {
        if self.documents.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        if query_embedding.len() != self.dimension {
            return Err(Text2SqlError::Embedding(format!(
                "Query embedding dimension {} doesn't match store dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let mut results: Vec<SearchResult<'_>> = self
            .documents
            .iter()
            .map(|document| SearchResult {
                document,
                score: cosine_similarity(query_embedding, &document.embedding),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(top_k);

        Ok(results)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let encoded = serde_json::to_string(self)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let encoded = std::fs::read_to_string(path).map_err(|e| {
            Text2SqlError::Retrieval(format!(
                "Failed to read schema index {}: {}",
                path.display(),
                e
            ))
        })?;
        let store: Self = serde_json::from_str(&encoded)?;

        if let Some(doc) = store.documents.iter().find(|d| d.embedding.len() != store.dimension) {
            return Err(Text2SqlError::Retrieval(format!(
                "Schema index {} is inconsistent: document {} has dimension {}, expected {}",
                path.display(),
                doc.id,
                doc.embedding.len(),
                store.dimension
            )));
        }
        Ok(store)
    }
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
