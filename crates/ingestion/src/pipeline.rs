//! Idempotent upsert pipeline
//!
//! Merges externally fetched works into the local corpus. Documents key on
//! their external id, authors and topics on normalized identity keys, so
//! re-processing the same page never duplicates entities. One bad work
//! skips that work only; the rest of the batch proceeds.

use crate::chunker::{chunk_text, ChunkingConfig};
use crate::normalize::{self, NormalizedWork};
use scholargraph_common::embeddings::{Embedder, HashEmbedder};
use scholargraph_common::errors::{EngineError, Result};
use scholargraph_common::model::{Author, Chunk, Document, SecurityLevel, Topic, WorkRecord};
use scholargraph_common::store::{DocumentStore, GraphStore};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Default minimum query-term coverage for the relevance gate
pub const DEFAULT_MIN_QUERY_COVERAGE: f64 = 0.18;

/// Counters describing one merge batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub works_processed: u32,
    pub works_skipped: u32,
    pub documents_created: u32,
    pub documents_updated: u32,
    pub authors_created: u32,
    pub authors_updated: u32,
    pub topics_created: u32,
    pub topics_updated: u32,
    pub chunks_embedded: u32,
}

impl MergeOutcome {
    /// Documents created or updated by this batch
    pub fn documents_touched(&self) -> u32 {
        self.documents_created + self.documents_updated
    }
}

/// Merges normalized works into the document store and graph
pub struct UpsertPipeline {
    documents: Arc<dyn DocumentStore>,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    min_query_coverage: f64,
}

impl UpsertPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            documents,
            graph,
            embedder,
            chunking: ChunkingConfig::default(),
            min_query_coverage: DEFAULT_MIN_QUERY_COVERAGE,
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_min_query_coverage(mut self, coverage: f64) -> Self {
        self.min_query_coverage = coverage.clamp(0.0, 1.0);
        self
    }

    /// Merge a batch of raw works fetched for `query`.
    ///
    /// Normalization failures, off-topic works, and identity conflicts skip
    /// the individual work. Store failures abort the batch; partial results
    /// already committed remain in place.
    #[instrument(skip(self, works), fields(query = %query, count = works.len()))]
    pub async fn merge_works(&self, query: &str, works: &[WorkRecord]) -> Result<MergeOutcome> {
        let query_terms = normalize::tokenize(query);
        let mut outcome = MergeOutcome::default();

        for record in works {
            let work = match normalize::normalize_work(record) {
                Ok(work) => work,
                Err(err) => {
                    warn!(error = %err, "Work skipped during normalization");
                    outcome.works_skipped += 1;
                    continue;
                }
            };

            if !normalize::is_relevant(&work, &query_terms, self.min_query_coverage) {
                info!(external_id = %work.external_id, "Work skipped: low query alignment");
                outcome.works_skipped += 1;
                continue;
            }

            match self.upsert_work(&work, &mut outcome).await {
                Ok(()) => outcome.works_processed += 1,
                Err(err) if matches!(err, EngineError::UpsertConflict { .. }) => {
                    warn!(external_id = %work.external_id, error = %err, "Work skipped");
                    outcome.works_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        metrics::counter!("ingest_works_processed_total")
            .increment(u64::from(outcome.works_processed));
        metrics::counter!("ingest_works_skipped_total").increment(u64::from(outcome.works_skipped));
        info!(
            processed = outcome.works_processed,
            skipped = outcome.works_skipped,
            documents_touched = outcome.documents_touched(),
            "Merge batch complete"
        );
        Ok(outcome)
    }

    async fn upsert_work(&self, work: &NormalizedWork, outcome: &mut MergeOutcome) -> Result<()> {
        let author_ids = self.upsert_authors(work, outcome).await?;
        let topic_ids = self.upsert_topics(work, outcome).await?;

        let (document_id, security_level, content_changed) =
            match self.documents.find_document_by_external_id(&work.external_id).await? {
                Some(existing) => {
                    let changed = existing.title != work.title
                        || existing.abstract_text != work.abstract_text;
                    outcome.documents_updated += 1;
                    (existing.id, existing.security_level, changed)
                }
                None => {
                    outcome.documents_created += 1;
                    (Uuid::new_v4(), SecurityLevel::Public, true)
                }
            };

        self.documents
            .put_document(Document {
                id: document_id,
                external_id: work.external_id.clone(),
                title: work.title.clone(),
                abstract_text: work.abstract_text.clone(),
                published_date: work.published_date,
                doi: work.doi.clone(),
                security_level,
                author_ids: author_ids.clone(),
                topic_ids: topic_ids.clone(),
            })
            .await?;

        // Graph degradation must not lose the document itself
        if let Err(err) = self
            .graph
            .replace_document_edges(document_id, &author_ids, &topic_ids)
            .await
        {
            if err.is_degradable() {
                warn!(error = %err, "Graph edges not synchronized, document stored without them");
            } else {
                return Err(err);
            }
        }

        if content_changed {
            outcome.chunks_embedded += self.rebuild_chunks(document_id, work).await?;
        }
        Ok(())
    }

    async fn upsert_authors(
        &self,
        work: &NormalizedWork,
        outcome: &mut MergeOutcome,
    ) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(work.authors.len());
        for author in &work.authors {
            let id = match self.documents.find_author_by_key(&author.key).await? {
                Some(existing) => {
                    // Same identity key pointing at a different upstream
                    // entity is a hard conflict, not an update
                    if !existing.external_id.is_empty()
                        && !author.external_id.is_empty()
                        && existing.external_id != author.external_id
                    {
                        return Err(EngineError::UpsertConflict {
                            key: author.key.clone(),
                            message: format!(
                                "author key maps to '{}' but work claims '{}'",
                                existing.external_id, author.external_id
                            ),
                        });
                    }
                    outcome.authors_updated += 1;
                    existing.id
                }
                None => {
                    outcome.authors_created += 1;
                    Uuid::new_v4()
                }
            };
            self.documents
                .put_author(
                    &author.key,
                    Author {
                        id,
                        external_id: author.external_id.clone(),
                        name: author.name.clone(),
                        institution: author.institution.clone(),
                    },
                )
                .await?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn upsert_topics(
        &self,
        work: &NormalizedWork,
        outcome: &mut MergeOutcome,
    ) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(work.topics.len());
        for topic in &work.topics {
            let id = match self.documents.find_topic_by_key(&topic.key).await? {
                Some(existing) => {
                    outcome.topics_updated += 1;
                    existing.id
                }
                None => {
                    outcome.topics_created += 1;
                    Uuid::new_v4()
                }
            };
            self.documents
                .put_topic(
                    &topic.key,
                    Topic {
                        id,
                        external_id: topic.external_id.clone(),
                        name: topic.name.clone(),
                    },
                )
                .await?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Re-chunk and re-embed a document's text, retiring the previous
    /// chunk generation. Falls back to deterministic hash vectors when the
    /// embedding provider is down.
    async fn rebuild_chunks(&self, document_id: Uuid, work: &NormalizedWork) -> Result<u32> {
        let text = format!("{}\n\n{}", work.title, work.abstract_text);
        let spans = chunk_text(&text, &self.chunking);
        if spans.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(err) => {
                warn!(error = %err, "Embedding provider down, using hash fallback");
                HashEmbedder::new(self.embedder.dimension())
                    .embed_batch(&texts)
                    .await?
            }
        };

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .zip(embeddings)
            .map(|(span, embedding)| Chunk {
                id: Uuid::new_v4(),
                document_id,
                ordinal: span.ordinal,
                text: span.text,
                embedding: Some(embedding),
            })
            .collect();
        let count = chunks.len() as u32;
        self.documents.replace_chunks(document_id, chunks).await?;
        Ok(count)
    }
}
