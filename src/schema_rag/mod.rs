//! Schema retrieval: embeddings, the vector index and the offline indexer.

pub mod embedder;
pub mod indexer;
pub mod retriever;
pub mod vector_store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use indexer::{render_table_document, SchemaIndexer, TableSchema};
pub use retriever::{ContextRetriever, VectorRetriever};
pub use vector_store::{Document, Embedding, InMemoryVectorStore};
