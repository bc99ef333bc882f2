//! ScholarGraph Common Library
//!
//! Shared code for the retrieval engine and ingestion pipeline including:
//! - Domain model (documents, authors, topics, graph nodes, score breakdowns)
//! - Collaborator store traits and an in-memory corpus
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Bounded LRU response cache

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod model;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{EngineError, Result};
pub use store::{ChunkIndex, DocumentStore, GraphStore, MemoryCorpus, WorksClient};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
