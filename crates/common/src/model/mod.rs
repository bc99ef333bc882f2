//! Domain model for ScholarGraph
//!
//! Documents, authors, topics, graph nodes/edges, score breakdowns, and the
//! request/response payloads exchanged with callers. External works payloads
//! are strongly typed with explicit optional fields; defaulting happens in
//! the ingestion normalizer, never silently at deserialization.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visibility tier applied before documents are scored or returned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLevel {
    Public,
    Internal,
    Confidential,
}

impl SecurityLevel {
    /// Total rank order. Higher rank means more restricted.
    pub fn rank(&self) -> u8 {
        match self {
            SecurityLevel::Public => 0,
            SecurityLevel::Internal => 1,
            SecurityLevel::Confidential => 2,
        }
    }

    /// Whether a document at this level is visible to the given clearance.
    pub fn visible_at(&self, clearance: SecurityLevel) -> bool {
        self.rank() <= clearance.rank()
    }

    /// Parse a clearance string. Unknown values are rejected, not defaulted.
    pub fn parse(value: &str) -> Option<SecurityLevel> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PUBLIC" => Some(SecurityLevel::Public),
            "INTERNAL" => Some(SecurityLevel::Internal),
            "CONFIDENTIAL" => Some(SecurityLevel::Confidential),
            _ => None,
        }
    }
}

/// A paper in the local corpus.
///
/// Created by ingestion and mutated only by the upsert pipeline; the ranking
/// path treats documents as immutable for the duration of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,

    /// External source identifier, the idempotent-upsert key
    pub external_id: String,

    pub title: String,

    pub abstract_text: String,

    pub published_date: Option<NaiveDate>,

    pub doi: Option<String>,

    pub security_level: SecurityLevel,

    /// Author ids in authorship order
    pub author_ids: Vec<Uuid>,

    pub topic_ids: Vec<Uuid>,
}

/// A text span of a document with its embedding.
///
/// Chunks are never mutated after creation; re-chunking replaces a
/// document's chunk set wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,

    pub document_id: Uuid,

    /// Ordinal position within the document
    pub ordinal: u32,

    pub text: String,

    /// Fixed-dimension embedding vector; None until the embed step runs
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub institution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
}

/// Kind of a graph node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Paper,
    Author,
    Topic,
}

/// Graph node identity: kind plus local entity id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub kind: NodeKind,
    pub id: Uuid,
}

impl NodeId {
    pub fn paper(id: Uuid) -> Self {
        Self {
            kind: NodeKind::Paper,
            id,
        }
    }

    pub fn author(id: Uuid) -> Self {
        Self {
            kind: NodeKind::Author,
            id,
        }
    }

    pub fn topic(id: Uuid) -> Self {
        Self {
            kind: NodeKind::Topic,
            id,
        }
    }
}

impl Ord for NodeKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl PartialOrd for NodeKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Typed edge kinds in the knowledge graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Wrote,
    HasTopic,
    /// Derived from shared WROTE edges, never stored independently
    CollaboratedWith,
}

/// A typed edge between two graph nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// Precomputed per-node authority and centrality scores.
///
/// Recomputed in batch by the graph metrics engine; stale between
/// recomputations and read-only to the ranking path.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetrics {
    pub authority: f64,
    pub centrality: f64,
}

/// Per-candidate component scores, each independently normalized to [0,1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub semantic_relevance: f64,
    pub query_alignment: f64,
    pub graph_authority: f64,
    pub graph_centrality: f64,
}

impl ScoreBreakdown {
    /// Clamp every component to [0,1], mapping NaN to 0.
    ///
    /// Undefined components must never propagate into the weighted sum.
    pub fn normalized(self) -> Self {
        Self {
            semantic_relevance: clamp_unit(self.semantic_relevance),
            query_alignment: clamp_unit(self.query_alignment),
            graph_authority: clamp_unit(self.graph_authority),
            graph_centrality: clamp_unit(self.graph_centrality),
        }
    }
}

/// Clamp a score to [0,1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One step in a reconstructed explanation path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathStep {
    pub from: String,
    pub edge: String,
    pub to: String,
}

/// Retrieval request from the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub clearance: SecurityLevel,
    pub page: u32,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, clearance: SecurityLevel, page: u32) -> Self {
        Self {
            query: query.into(),
            clearance,
            page,
        }
    }
}

/// A scored, explained document in the ranked result list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDocument {
    pub document_id: Uuid,
    pub title: String,
    pub snippet: String,
    pub published_date: Option<NaiveDate>,
    pub authors: Vec<String>,
    pub topics: Vec<String>,
    pub score_breakdown: ScoreBreakdown,
    pub relevance_score: f64,
    pub why_matched: String,
    /// Edge sequence from the synthetic query node to this document's
    /// neighborhood; empty when no path was found
    pub graph_path: Vec<PathStep>,
    /// Hop count of the reconstructed path; None when no path was found
    pub graph_hop_distance: Option<u32>,
}

/// Reason code attached to live-fetch metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LiveFetchReason {
    Fetched,
    Disabled,
    EmptyQuery,
    PageNotSupported,
    SufficientLocal,
    MissingApiKey,
    Cooldown,
    Failed,
}

/// Live-fetch metadata reported with every retrieval response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFetchReport {
    pub enabled: bool,
    pub attempted: bool,
    pub reason: LiveFetchReason,
    pub works_processed: u32,
    pub documents_touched: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LiveFetchReport {
    /// A report for an evaluation that decided not to fetch.
    pub fn skipped(enabled: bool, reason: LiveFetchReason) -> Self {
        Self {
            enabled,
            attempted: false,
            reason,
            works_processed: 0,
            documents_touched: 0,
            duration_ms: 0,
            error: None,
        }
    }

    /// Whether the retrieval pass should run again after this fetch.
    pub fn should_rerun(&self) -> bool {
        self.attempted && self.reason == LiveFetchReason::Fetched && self.documents_touched > 0
    }
}

/// Retrieval response returned to the caller.
///
/// Always a valid payload; degraded collaborators surface via zeroed signal
/// components and the live-fetch reason code, never as a bare error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub clearance: SecurityLevel,
    pub page: u32,
    pub results: Vec<RankedDocument>,
    pub result_count: u32,
    /// Documents filtered by clearance before scoring
    pub hidden_count: u32,
    pub took_ms: u64,
    pub live_fetch: LiveFetchReport,
}

/// Externally fetched author entry, as delivered by the works API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkAuthor {
    pub external_id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub author_order: Option<u32>,
}

/// Externally fetched concept/topic entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkConcept {
    pub external_id: Option<String>,
    pub name: Option<String>,
}

/// Externally fetched work record.
///
/// The abstract may arrive either as plain text or as an inverted index
/// (position map); the normalizer decodes the latter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRecord {
    pub external_id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub abstract_inverted_index: Option<std::collections::HashMap<String, Vec<u32>>>,
    #[serde(default)]
    pub published_date: Option<NaiveDate>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub authors: Vec<WorkAuthor>,
    #[serde(default)]
    pub concepts: Vec<WorkConcept>,
}

/// One page of works from the external corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorksPage {
    pub works: Vec<WorkRecord>,
    /// Opaque pagination cursor; None when the listing is exhausted
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_ordering() {
        assert!(SecurityLevel::Public.visible_at(SecurityLevel::Public));
        assert!(SecurityLevel::Public.visible_at(SecurityLevel::Confidential));
        assert!(!SecurityLevel::Confidential.visible_at(SecurityLevel::Internal));
    }

    #[test]
    fn test_security_level_parse() {
        assert_eq!(SecurityLevel::parse(" internal "), Some(SecurityLevel::Internal));
        assert_eq!(SecurityLevel::parse("secret"), None);
    }

    #[test]
    fn test_breakdown_normalization() {
        let raw = ScoreBreakdown {
            semantic_relevance: f64::NAN,
            query_alignment: 1.7,
            graph_authority: -0.2,
            graph_centrality: 0.5,
        };
        let normalized = raw.normalized();
        assert_eq!(normalized.semantic_relevance, 0.0);
        assert_eq!(normalized.query_alignment, 1.0);
        assert_eq!(normalized.graph_authority, 0.0);
        assert_eq!(normalized.graph_centrality, 0.5);
    }

    #[test]
    fn test_live_fetch_rerun_rule() {
        let mut report = LiveFetchReport::skipped(true, LiveFetchReason::Cooldown);
        assert!(!report.should_rerun());

        report.attempted = true;
        report.reason = LiveFetchReason::Fetched;
        report.documents_touched = 3;
        assert!(report.should_rerun());

        report.documents_touched = 0;
        assert!(!report.should_rerun());
    }
}
