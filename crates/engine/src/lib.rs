//! ScholarGraph Retrieval Engine
//!
//! Hybrid retrieval and ranking over a scholarly corpus:
//! - Semantic chunk scoring with a lexical fallback
//! - Query-alignment term overlap
//! - Bounded graph expansion feeding authority and centrality signals
//! - Weighted score combination with a deterministic total order
//! - Cooldown-gated live fetch from the external works corpus
//! - BFS path explanations for ranked results

pub mod combine;
pub mod engine;
pub mod expand;
pub mod explain;
pub mod graph_metrics;
pub mod lexical;
pub mod live_fetch;
pub mod semantic;

pub use engine::RetrievalEngine;
pub use live_fetch::LiveFetchController;
