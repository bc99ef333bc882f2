//! ScholarGraph Ingestion Library
//!
//! Turns external work records into local documents, authors, and topics:
//! - OpenAlex-style works client with retry and cursor pagination
//! - Normalization (inverted-index abstracts, identity keys, validation)
//! - Idempotent upsert pipeline with exact graph-edge synchronization

pub mod chunker;
pub mod client;
pub mod normalize;
pub mod pipeline;

pub use client::OpenAlexClient;
pub use normalize::{normalize_work, NormalizedWork};
pub use pipeline::{MergeOutcome, UpsertPipeline};
