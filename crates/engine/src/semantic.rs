//! Semantic candidate scoring
//!
//! Embeds the query, scans the chunk index, and aggregates chunk hits to
//! per-document scores. A document's semantic relevance is taken from its
//! single closest chunk, so long documents gain no advantage from chunk
//! count. Clearance filtering happens here, before any scoring downstream.

use scholargraph_common::embeddings::Embedder;
use scholargraph_common::errors::Result;
use scholargraph_common::model::{Document, SecurityLevel};
use scholargraph_common::store::{ChunkIndex, DocumentStore};
use scholargraph_ingestion::normalize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A document admitted by the semantic pass
#[derive(Debug, Clone)]
pub struct SemanticCandidate {
    pub document: Document,
    /// Closest chunk, absent when the candidate came from the lexical
    /// fallback
    pub best_chunk_id: Option<Uuid>,
    pub best_distance: Option<f64>,
    pub semantic_relevance: f64,
}

/// Outcome of one semantic pass
#[derive(Debug, Clone, Default)]
pub struct SemanticPass {
    pub candidates: Vec<SemanticCandidate>,
    /// Documents dropped by clearance filtering
    pub hidden_count: u32,
    /// True when the embedding provider was down and the lexical fallback
    /// produced the candidates
    pub degraded: bool,
}

/// Embedding-driven candidate discovery with a lexical fallback
pub struct SemanticScorer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn ChunkIndex>,
    documents: Arc<dyn DocumentStore>,
    top_k: usize,
}

impl SemanticScorer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn ChunkIndex>,
        documents: Arc<dyn DocumentStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            documents,
            top_k,
        }
    }

    pub async fn run(&self, query: &str, clearance: SecurityLevel) -> Result<SemanticPass> {
        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(err) if err.is_degradable() => {
                warn!(error = %err, "Embedding unavailable, falling back to lexical scan");
                metrics::counter!("semantic_fallback_total").increment(1);
                return self.lexical_fallback(query, clearance).await;
            }
            Err(err) => return Err(err),
        };

        let hits = self.index.nearest_chunks(&vector, self.top_k).await?;

        // Keep each document's closest chunk only
        let mut best: HashMap<Uuid, (Uuid, f64)> = HashMap::new();
        for hit in hits {
            match best.get(&hit.document_id) {
                Some((_, distance)) if *distance <= hit.distance => {}
                _ => {
                    best.insert(hit.document_id, (hit.chunk_id, hit.distance));
                }
            }
        }

        let ids: Vec<Uuid> = best.keys().copied().collect();
        let documents = self.documents.get_documents(&ids).await?;

        let mut hidden_count = 0u32;
        let mut candidates = Vec::with_capacity(documents.len());
        for document in documents {
            if !document.security_level.visible_at(clearance) {
                hidden_count += 1;
                continue;
            }
            let (chunk_id, distance) = best[&document.id];
            candidates.push(SemanticCandidate {
                document,
                best_chunk_id: Some(chunk_id),
                best_distance: Some(distance),
                semantic_relevance: semantic_score(distance),
            });
        }

        // Deterministic scan order for everything downstream
        candidates.sort_by(|a, b| {
            a.best_distance
                .partial_cmp(&b.best_distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });

        debug!(
            candidates = candidates.len(),
            hidden = hidden_count,
            "Semantic pass complete"
        );
        Ok(SemanticPass {
            candidates,
            hidden_count,
            degraded: false,
        })
    }

    /// Term-overlap scan over the whole corpus. Semantic relevance is zero
    /// for every candidate; ordering falls to the alignment signal.
    async fn lexical_fallback(&self, query: &str, clearance: SecurityLevel) -> Result<SemanticPass> {
        let query_terms = normalize::tokenize(query);
        let mut hidden_count = 0u32;
        let mut candidates = Vec::new();

        for document in self.documents.list_documents().await? {
            let text = format!("{} {}", document.title, document.abstract_text);
            let terms = normalize::tokenize(&text);
            if query_terms.intersection(&terms).next().is_none() {
                continue;
            }
            if !document.security_level.visible_at(clearance) {
                hidden_count += 1;
                continue;
            }
            candidates.push(SemanticCandidate {
                document,
                best_chunk_id: None,
                best_distance: None,
                semantic_relevance: 0.0,
            });
        }

        candidates.sort_by_key(|c| c.document.id);
        Ok(SemanticPass {
            candidates,
            hidden_count,
            degraded: true,
        })
    }
}

/// Distance-to-relevance mapping; a distance of zero scores 1.0.
pub fn semantic_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}
