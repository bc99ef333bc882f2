//! Collaborator store seams
//!
//! The engine consumes externally supplied primitives behind async traits:
//! a vector-capable chunk index, a document store, a knowledge-graph store,
//! and an external works client. `MemoryCorpus` implements the first three
//! in memory and backs the test suite and store-less callers.

mod memory;

pub use memory::MemoryCorpus;

use crate::errors::Result;
use crate::model::{
    Author, Chunk, Document, EdgeKind, GraphEdge, NodeId, NodeMetrics, Topic, WorksPage,
};
use uuid::Uuid;

/// A nearest-neighbor hit from the chunk index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkHit {
    pub document_id: Uuid,
    pub chunk_id: Uuid,
    /// Cosine distance; smaller is closer
    pub distance: f64,
}

/// Entity counts used by idempotency checks and reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusCounts {
    pub documents: usize,
    pub authors: usize,
    pub topics: usize,
    pub chunks: usize,
}

/// K-nearest-neighbor similarity query over chunk embeddings
#[async_trait::async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Return up to `k` chunk hits ordered by ascending distance, ties
    /// broken by chunk id for a deterministic scan order.
    async fn nearest_chunks(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>>;
}

/// Document, author, and topic persistence
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    async fn get_documents(&self, ids: &[Uuid]) -> Result<Vec<Document>>;

    async fn find_document_by_external_id(&self, external_id: &str) -> Result<Option<Document>>;

    /// Insert or replace a document wholesale
    async fn put_document(&self, document: Document) -> Result<()>;

    /// Every stored document. Backs the lexical fallback scan when the
    /// embedding provider is down; small corpora only.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Look up an author by its normalized identity key
    async fn find_author_by_key(&self, key: &str) -> Result<Option<Author>>;

    /// Insert or replace an author under its normalized identity key
    async fn put_author(&self, key: &str, author: Author) -> Result<()>;

    async fn find_topic_by_key(&self, key: &str) -> Result<Option<Topic>>;

    async fn put_topic(&self, key: &str, topic: Topic) -> Result<()>;

    async fn get_authors(&self, ids: &[Uuid]) -> Result<Vec<Author>>;

    async fn get_topics(&self, ids: &[Uuid]) -> Result<Vec<Topic>>;

    async fn get_chunk(&self, id: Uuid) -> Result<Option<Chunk>>;

    /// Replace a document's chunk set wholesale (re-chunking retires the
    /// previous generation)
    async fn replace_chunks(&self, document_id: Uuid, chunks: Vec<Chunk>) -> Result<()>;

    async fn counts(&self) -> Result<CorpusCounts>;
}

/// Knowledge-graph store: typed edges and precomputed node metrics
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Edges incident to `node`, restricted to the given kinds. The
    /// expander issues one call per visited node during BFS.
    async fn adjacent(&self, node: NodeId, kinds: &[EdgeKind]) -> Result<Vec<GraphEdge>>;

    /// Precomputed metrics for a node; None when never scored
    async fn metrics(&self, node: NodeId) -> Result<Option<NodeMetrics>>;

    /// Corpus-wide maximum centrality, used for query-time normalization
    async fn max_centrality(&self) -> Result<f64>;

    /// Every stored edge of the given kinds (batch metrics input)
    async fn all_edges(&self, kinds: &[EdgeKind]) -> Result<Vec<GraphEdge>>;

    /// Replace a document's WROTE and HAS_TOPIC edge sets exactly, and
    /// refresh derived COLLABORATED_WITH edges among its authors.
    async fn replace_document_edges(
        &self,
        document_id: Uuid,
        author_ids: &[Uuid],
        topic_ids: &[Uuid],
    ) -> Result<()>;

    /// Persist a batch of recomputed node metrics
    async fn put_metrics(&self, metrics: Vec<(NodeId, NodeMetrics)>) -> Result<()>;
}

/// External works-fetch client. Retry and backoff live inside the
/// implementation and are opaque to the engine.
#[async_trait::async_trait]
pub trait WorksClient: Send + Sync {
    async fn fetch_works(
        &self,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<WorksPage>;
}
