//! Retrieval orchestration
//!
//! One entry point, `RetrievalEngine::retrieve`, drives the whole flow:
//! validate, probe the response cache, run the semantic pass, give the
//! live-fetch controller one chance to enrich a sparse corpus, expand the
//! graph, combine signals, paginate, and explain the returned page.

use crate::combine::{self, ScoreCombiner};
use crate::expand::GraphExpander;
use crate::explain;
use crate::lexical;
use crate::live_fetch::LiveFetchController;
use crate::semantic::{SemanticPass, SemanticScorer};
use scholargraph_common::cache::{response_fingerprint, ResponseCache};
use scholargraph_common::config::AppConfig;
use scholargraph_common::embeddings::Embedder;
use scholargraph_common::errors::{EngineError, Result};
use scholargraph_common::model::{
    LiveFetchReason, LiveFetchReport, NodeId, RankedDocument, RetrievalRequest, RetrievalResponse,
    ScoreBreakdown, SecurityLevel,
};
use scholargraph_common::store::{ChunkIndex, DocumentStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// The hybrid retrieval and ranking engine
pub struct RetrievalEngine {
    config: AppConfig,
    documents: Arc<dyn DocumentStore>,
    semantic: SemanticScorer,
    expander: GraphExpander,
    combiner: ScoreCombiner,
    live_fetch: Option<Arc<LiveFetchController>>,
    cache: ResponseCache,
}

impl RetrievalEngine {
    pub fn new(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn ChunkIndex>,
        documents: Arc<dyn DocumentStore>,
        graph: Arc<dyn scholargraph_common::store::GraphStore>,
        live_fetch: Option<Arc<LiveFetchController>>,
    ) -> Result<Self> {
        config.validate()?;
        let semantic = SemanticScorer::new(
            embedder,
            index,
            documents.clone(),
            config.retrieval.top_k_chunks,
        );
        let expander = GraphExpander::new(
            graph,
            config.retrieval.hop_limit,
            config.retrieval.fanout_cap,
        );
        let combiner = ScoreCombiner::new(config.retrieval.weights);
        let cache = ResponseCache::new(config.cache.capacity);
        Ok(Self {
            config,
            documents,
            semantic,
            expander,
            combiner,
            live_fetch,
            cache,
        })
    }

    /// Run one retrieval request end to end.
    #[instrument(skip(self, request), fields(query = %request.query, page = request.page))]
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        let started = Instant::now();
        let query = request.query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidQuery {
                message: "query must not be empty".into(),
            });
        }
        if request.page == 0 {
            return Err(EngineError::InvalidPage { page: request.page });
        }

        let key = response_fingerprint(query, request.clearance, request.page);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let mut pass = self.semantic.run(query, request.clearance).await?;

        let live_fetch = match &self.live_fetch {
            Some(controller) => {
                let report = controller
                    .run(query, request.page, pass.candidates.len(), Instant::now())
                    .await;
                // A merge that touched documents earns exactly one re-run,
                // and invalidates responses cached before the merge
                if report.should_rerun() {
                    self.cache.clear();
                    pass = self.semantic.run(query, request.clearance).await?;
                }
                report
            }
            None => LiveFetchReport::skipped(false, LiveFetchReason::Disabled),
        };

        let response = self
            .assemble(query, request.clearance, request.page, pass, live_fetch, started)
            .await?;

        self.cache.put(key, response.clone());
        Ok(response)
    }

    async fn assemble(
        &self,
        query: &str,
        clearance: SecurityLevel,
        page: u32,
        pass: SemanticPass,
        live_fetch: LiveFetchReport,
        started: Instant,
    ) -> Result<RetrievalResponse> {
        let seed_ids: Vec<Uuid> = pass.candidates.iter().map(|c| c.document.id).collect();
        let expansion = self.expander.expand(&seed_ids).await?;
        let query_terms = lexical::query_terms(query);

        // Topic lookups are independent per candidate, issue them together
        let candidate_topics = futures::future::try_join_all(
            pass.candidates
                .iter()
                .map(|c| self.documents.get_topics(&c.document.topic_ids)),
        )
        .await?;

        // Score every candidate
        let mut scored: Vec<(f64, ScoreBreakdown, usize)> = Vec::with_capacity(pass.candidates.len());
        for (idx, (candidate, topics)) in pass.candidates.iter().zip(&candidate_topics).enumerate() {
            let topic_names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();
            let signals = expansion
                .signals
                .get(&candidate.document.id)
                .copied()
                .unwrap_or_default();
            let breakdown = ScoreBreakdown {
                semantic_relevance: candidate.semantic_relevance,
                query_alignment: lexical::alignment_score(
                    &candidate.document,
                    &topic_names,
                    &query_terms,
                ),
                graph_authority: signals.authority,
                graph_centrality: signals.centrality,
            }
            .normalized();
            scored.push((self.combiner.combine(breakdown), breakdown, idx));
        }

        scored.sort_by(|a, b| {
            combine::compare(
                (a.0, a.1.semantic_relevance, pass.candidates[a.2].document.id),
                (b.0, b.1.semantic_relevance, pass.candidates[b.2].document.id),
            )
        });

        let result_count = scored.len() as u32;
        let page_size = self.config.retrieval.page_size as usize;
        let offset = (page as usize - 1).saturating_mul(page_size);
        let page_slice: Vec<(f64, ScoreBreakdown, usize)> =
            scored.into_iter().skip(offset).take(page_size).collect();

        let labels = self.node_labels(&pass, &expansion.subgraph).await?;
        let mut results = Vec::with_capacity(page_slice.len());
        for (relevance, breakdown, idx) in page_slice {
            let candidate = &pass.candidates[idx];
            let document = &candidate.document;

            let (authors, topics) = tokio::try_join!(
                self.documents.get_authors(&document.author_ids),
                self.documents.get_topics(&document.topic_ids),
            )?;
            let topic_names: Vec<String> = topics.into_iter().map(|t| t.name).collect();

            let (graph_path, graph_hop_distance, has_path) =
                match explain::shortest_path(document.id, &seed_ids, &expansion.subgraph, &labels) {
                    Ok(path) => (path.steps, Some(path.hops), true),
                    Err(err) if err.is_degradable() => (Vec::new(), None, false),
                    Err(err) => return Err(err),
                };

            results.push(RankedDocument {
                document_id: document.id,
                title: document.title.clone(),
                snippet: self.snippet(candidate).await?,
                published_date: document.published_date,
                authors: authors.into_iter().map(|a| a.name).collect(),
                topics: topic_names.clone(),
                score_breakdown: breakdown,
                relevance_score: relevance,
                why_matched: explain::why_matched(&breakdown, &topic_names, has_path),
                graph_path,
                graph_hop_distance,
            });
        }

        let took_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("retrieval_duration_ms").record(took_ms as f64);
        info!(
            results = results.len(),
            total = result_count,
            hidden = pass.hidden_count,
            degraded_semantic = pass.degraded,
            degraded_graph = expansion.degraded,
            "Retrieval complete"
        );

        Ok(RetrievalResponse {
            query: query.to_string(),
            clearance,
            page,
            results,
            result_count,
            hidden_count: pass.hidden_count,
            took_ms,
            live_fetch,
        })
    }

    /// Display names for every node the explanation paths can touch.
    async fn node_labels(
        &self,
        pass: &SemanticPass,
        subgraph: &[scholargraph_common::model::GraphEdge],
    ) -> Result<HashMap<NodeId, String>> {
        use scholargraph_common::model::NodeKind;

        let mut paper_ids: Vec<Uuid> = Vec::new();
        let mut author_ids: Vec<Uuid> = Vec::new();
        let mut topic_ids: Vec<Uuid> = Vec::new();
        for node in subgraph.iter().flat_map(|e| [e.from, e.to]) {
            let bucket = match node.kind {
                NodeKind::Paper => &mut paper_ids,
                NodeKind::Author => &mut author_ids,
                NodeKind::Topic => &mut topic_ids,
            };
            if !bucket.contains(&node.id) {
                bucket.push(node.id);
            }
        }

        // The three lookups have no data dependency
        let (documents, authors, topics) = tokio::try_join!(
            self.documents.get_documents(&paper_ids),
            self.documents.get_authors(&author_ids),
            self.documents.get_topics(&topic_ids),
        )?;

        let mut labels: HashMap<NodeId, String> = HashMap::new();
        for candidate in &pass.candidates {
            labels.insert(
                NodeId::paper(candidate.document.id),
                candidate.document.title.clone(),
            );
        }
        for document in documents {
            labels.insert(NodeId::paper(document.id), document.title);
        }
        for author in authors {
            labels.insert(NodeId::author(author.id), author.name);
        }
        for topic in topics {
            labels.insert(NodeId::topic(topic.id), topic.name);
        }
        Ok(labels)
    }

    /// Snippet from the best-matching chunk, falling back to the abstract.
    async fn snippet(&self, candidate: &crate::semantic::SemanticCandidate) -> Result<String> {
        let max_chars = self.config.retrieval.snippet_max_chars;
        let text = match candidate.best_chunk_id {
            Some(chunk_id) => match self.documents.get_chunk(chunk_id).await? {
                Some(chunk) => chunk.text,
                None => candidate.document.abstract_text.clone(),
            },
            None => candidate.document.abstract_text.clone(),
        };
        Ok(truncate_chars(&text, max_chars))
    }
}

/// Truncate on a character boundary, appending an ellipsis when cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholargraph_common::embeddings::HashEmbedder;
    use scholargraph_common::model::{Chunk, Document, WorkAuthor, WorkRecord, WorksPage};
    use scholargraph_common::store::{GraphStore, MemoryCorpus, WorksClient};
    use scholargraph_ingestion::UpsertPipeline;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 8), "abcde...");
        // Multibyte safe
        let cut = truncate_chars(&"é".repeat(20), 10);
        assert_eq!(cut.chars().count(), 10);
    }

    struct StubWorks;

    #[async_trait::async_trait]
    impl WorksClient for StubWorks {
        async fn fetch_works(
            &self,
            _query: &str,
            _cursor: Option<&str>,
            _limit: u32,
        ) -> scholargraph_common::errors::Result<WorksPage> {
            Ok(WorksPage {
                works: vec![WorkRecord {
                    external_id: Some("W-live".into()),
                    title: Some("Graph ranking at scale".into()),
                    abstract_text: Some("Live graph ranking methods for retrieval.".into()),
                    abstract_inverted_index: None,
                    published_date: None,
                    doi: None,
                    authors: vec![WorkAuthor {
                        external_id: Some("A-live".into()),
                        name: Some("Grace Hopper".into()),
                        institution: None,
                        author_order: Some(1),
                    }],
                    concepts: vec![],
                }],
                next_cursor: None,
            })
        }
    }

    async fn seed_document(corpus: &MemoryCorpus, title: &str, level: SecurityLevel) -> Uuid {
        let id = Uuid::new_v4();
        corpus
            .put_document(Document {
                id,
                external_id: format!("W-{id}"),
                title: title.to_string(),
                abstract_text: format!("{title} in depth."),
                published_date: None,
                doi: None,
                security_level: level,
                author_ids: vec![],
                topic_ids: vec![],
            })
            .await
            .unwrap();
        let embedder = HashEmbedder::new(8);
        let embedding = embedder.embed(title).await.unwrap();
        corpus
            .replace_chunks(
                id,
                vec![Chunk {
                    id: Uuid::new_v4(),
                    document_id: id,
                    ordinal: 0,
                    text: title.to_string(),
                    embedding: Some(embedding),
                }],
            )
            .await
            .unwrap();
        id
    }

    fn engine(corpus: &Arc<MemoryCorpus>, live: bool) -> RetrievalEngine {
        let config = AppConfig::default();
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(8));
        let live_fetch = live.then(|| {
            let pipeline = Arc::new(UpsertPipeline::new(
                corpus.clone(),
                corpus.clone(),
                embedder.clone(),
            ));
            Arc::new(LiveFetchController::new(
                config.live_fetch.clone(),
                Arc::new(StubWorks),
                pipeline,
                true,
            ))
        });
        RetrievalEngine::new(
            config,
            embedder,
            corpus.clone(),
            corpus.clone(),
            corpus.clone(),
            live_fetch,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let corpus = Arc::new(MemoryCorpus::new());
        let engine = engine(&corpus, false);

        let empty = RetrievalRequest::new("   ", SecurityLevel::Public, 1);
        assert!(matches!(
            engine.retrieve(&empty).await.unwrap_err(),
            EngineError::InvalidQuery { .. }
        ));

        let zero_page = RetrievalRequest::new("graph", SecurityLevel::Public, 0);
        assert!(matches!(
            engine.retrieve(&zero_page).await.unwrap_err(),
            EngineError::InvalidPage { .. }
        ));
    }

    #[tokio::test]
    async fn test_clearance_hides_and_counts() {
        let corpus = Arc::new(MemoryCorpus::new());
        seed_document(&corpus, "Open spectrum paper", SecurityLevel::Public).await;
        seed_document(&corpus, "Sealed spectrum paper", SecurityLevel::Confidential).await;
        let engine = engine(&corpus, false);

        let public = engine
            .retrieve(&RetrievalRequest::new("spectrum", SecurityLevel::Public, 1))
            .await
            .unwrap();
        assert_eq!(public.result_count, 1);
        assert_eq!(public.hidden_count, 1);

        let cleared = engine
            .retrieve(&RetrievalRequest::new(
                "spectrum",
                SecurityLevel::Confidential,
                1,
            ))
            .await
            .unwrap();
        assert_eq!(cleared.result_count, 2);
        assert_eq!(cleared.hidden_count, 0);
    }

    #[tokio::test]
    async fn test_sparse_corpus_triggers_live_fetch_and_rerun() {
        let corpus = Arc::new(MemoryCorpus::new());
        let engine = engine(&corpus, true);

        let response = engine
            .retrieve(&RetrievalRequest::new(
                "graph ranking",
                SecurityLevel::Public,
                1,
            ))
            .await
            .unwrap();
        assert_eq!(response.live_fetch.reason, LiveFetchReason::Fetched);
        assert!(response.live_fetch.attempted);
        assert_eq!(response.live_fetch.documents_touched, 1);
        // The re-run after the merge surfaces the fetched document
        assert_eq!(response.result_count, 1);
        assert_eq!(response.results[0].title, "Graph ranking at scale");
        // A directly matched paper sits zero hops from the query
        assert_eq!(response.results[0].graph_hop_distance, Some(0));
    }

    #[tokio::test]
    async fn test_results_resolve_authors_and_topics() {
        use scholargraph_common::model::{Author, Topic};

        let corpus = Arc::new(MemoryCorpus::new());
        let author = Author {
            id: Uuid::new_v4(),
            external_id: "A1".into(),
            name: "Ada Lovelace".into(),
            institution: String::new(),
        };
        let topic = Topic {
            id: Uuid::new_v4(),
            external_id: "C1".into(),
            name: "Information Retrieval".into(),
        };
        corpus.put_author("ada lovelace", author.clone()).await.unwrap();
        corpus
            .put_topic("information retrieval", topic.clone())
            .await
            .unwrap();

        let doc_id = Uuid::new_v4();
        corpus
            .put_document(Document {
                id: doc_id,
                external_id: "W1".into(),
                title: "Ranking retrieval systems".into(),
                abstract_text: "Ranking retrieval systems in depth.".into(),
                published_date: None,
                doi: None,
                security_level: SecurityLevel::Public,
                author_ids: vec![author.id],
                topic_ids: vec![topic.id],
            })
            .await
            .unwrap();
        let embedder = HashEmbedder::new(8);
        let embedding = embedder.embed("ranking retrieval systems").await.unwrap();
        corpus
            .replace_chunks(
                doc_id,
                vec![Chunk {
                    id: Uuid::new_v4(),
                    document_id: doc_id,
                    ordinal: 0,
                    text: "Ranking retrieval systems".into(),
                    embedding: Some(embedding),
                }],
            )
            .await
            .unwrap();
        corpus
            .replace_document_edges(doc_id, &[author.id], &[topic.id])
            .await
            .unwrap();

        let engine = engine(&corpus, false);
        let response = engine
            .retrieve(&RetrievalRequest::new(
                "ranking retrieval",
                SecurityLevel::Public,
                1,
            ))
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].authors, vec!["Ada Lovelace".to_string()]);
        assert_eq!(
            response.results[0].topics,
            vec!["Information Retrieval".to_string()]
        );
        assert!(response.results[0]
            .why_matched
            .contains("Information Retrieval"));
    }

    #[tokio::test]
    async fn test_graph_outage_degrades_signals_not_results() {
        let corpus = Arc::new(MemoryCorpus::new());
        seed_document(&corpus, "Resilient retrieval", SecurityLevel::Public).await;
        corpus.set_graph_available(false);
        let engine = engine(&corpus, false);

        let response = engine
            .retrieve(&RetrievalRequest::new(
                "resilient retrieval",
                SecurityLevel::Public,
                1,
            ))
            .await
            .unwrap();
        assert_eq!(response.result_count, 1);
        let breakdown = response.results[0].score_breakdown;
        assert_eq!(breakdown.graph_authority, 0.0);
        assert_eq!(breakdown.graph_centrality, 0.0);
        assert!(breakdown.semantic_relevance > 0.0);
    }

    #[tokio::test]
    async fn test_pagination_is_stable_and_bounded() {
        let corpus = Arc::new(MemoryCorpus::new());
        for i in 0..15 {
            seed_document(&corpus, &format!("Ranking paper {i}"), SecurityLevel::Public).await;
        }
        let engine = engine(&corpus, false);

        let first = engine
            .retrieve(&RetrievalRequest::new("ranking", SecurityLevel::Public, 1))
            .await
            .unwrap();
        let second = engine
            .retrieve(&RetrievalRequest::new("ranking", SecurityLevel::Public, 2))
            .await
            .unwrap();
        assert_eq!(first.results.len(), 10);
        assert_eq!(second.results.len(), 5);
        assert_eq!(first.result_count, 15);

        // No overlap between pages
        for result in &second.results {
            assert!(first
                .results
                .iter()
                .all(|r| r.document_id != result.document_id));
        }

        // Far page is empty, not an error
        let far = engine
            .retrieve(&RetrievalRequest::new("ranking", SecurityLevel::Public, 9))
            .await
            .unwrap();
        assert!(far.results.is_empty());
        assert_eq!(far.result_count, 15);
    }

    #[tokio::test]
    async fn test_repeat_request_is_served_from_cache() {
        let corpus = Arc::new(MemoryCorpus::new());
        seed_document(&corpus, "Cached paper", SecurityLevel::Public).await;
        let engine = engine(&corpus, false);
        let request = RetrievalRequest::new("cached paper", SecurityLevel::Public, 1);

        let first = engine.retrieve(&request).await.unwrap();
        let second = engine.retrieve(&request).await.unwrap();
        assert_eq!(first.results.len(), second.results.len());
        // The cached response is returned verbatim, timing included
        assert_eq!(first.took_ms, second.took_ms);
    }
}
