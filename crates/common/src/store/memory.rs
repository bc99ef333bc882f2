//! In-memory corpus implementing the store traits
//!
//! Cosine-distance scan for the chunk index, adjacency maps for the graph.
//! Backs the test suite and callers without external stores. The graph side
//! can be switched unavailable to exercise degraded paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChunkHit, ChunkIndex, CorpusCounts, DocumentStore, GraphStore};
use crate::errors::{EngineError, Result};
use crate::model::{
    Author, Chunk, Document, EdgeKind, GraphEdge, NodeId, NodeMetrics, Topic,
};

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, Document>,
    documents_by_external: HashMap<String, Uuid>,
    authors: HashMap<Uuid, Author>,
    authors_by_key: HashMap<String, Uuid>,
    topics: HashMap<Uuid, Topic>,
    topics_by_key: HashMap<String, Uuid>,
    chunks: HashMap<Uuid, Chunk>,
    chunks_by_document: HashMap<Uuid, Vec<Uuid>>,
    edges: HashSet<GraphEdge>,
    adjacency: HashMap<NodeId, Vec<GraphEdge>>,
    metrics: HashMap<NodeId, NodeMetrics>,
}

impl Inner {
    fn insert_edge(&mut self, edge: GraphEdge) {
        if self.edges.insert(edge) {
            self.adjacency.entry(edge.from).or_default().push(edge);
            self.adjacency.entry(edge.to).or_default().push(edge);
        }
    }

    fn remove_edge(&mut self, edge: &GraphEdge) {
        if self.edges.remove(edge) {
            if let Some(list) = self.adjacency.get_mut(&edge.from) {
                list.retain(|e| e != edge);
            }
            if let Some(list) = self.adjacency.get_mut(&edge.to) {
                list.retain(|e| e != edge);
            }
        }
    }
}

/// In-memory document store + chunk index + graph store
pub struct MemoryCorpus {
    inner: RwLock<Inner>,
    graph_available: AtomicBool,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            graph_available: AtomicBool::new(true),
        }
    }

    /// Simulate graph-store outage; subsequent graph calls fail with
    /// `GraphStoreUnavailable` until re-enabled.
    pub fn set_graph_available(&self, available: bool) {
        self.graph_available.store(available, Ordering::SeqCst);
    }

    fn graph_guard(&self) -> Result<()> {
        if self.graph_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::GraphStoreUnavailable {
                message: "graph store marked unavailable".into(),
            })
        }
    }

    fn share_a_paper(inner: &Inner, a: Uuid, b: Uuid) -> bool {
        let papers_of = |author: Uuid| -> HashSet<Uuid> {
            inner
                .adjacency
                .get(&NodeId::author(author))
                .map(|list| {
                    list.iter()
                        .filter(|e| e.kind == EdgeKind::Wrote)
                        .map(|e| e.to.id)
                        .collect()
                })
                .unwrap_or_default()
        };
        !papers_of(a).is_disjoint(&papers_of(b))
    }

    /// Cosine distance between two vectors; 1.0 for degenerate inputs.
    fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
        let len = a.len().min(b.len());
        if len == 0 {
            return 1.0;
        }
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for i in 0..len {
            dot += f64::from(a[i]) * f64::from(b[i]);
            norm_a += f64::from(a[i]) * f64::from(a[i]);
            norm_b += f64::from(b[i]) * f64::from(b[i]);
        }
        if norm_a <= 0.0 || norm_b <= 0.0 {
            return 1.0;
        }
        1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

impl Default for MemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChunkIndex for MemoryCorpus {
    async fn nearest_chunks(&self, vector: &[f32], k: usize) -> Result<Vec<ChunkHit>> {
        let inner = self.inner.read().await;

        let mut hits: Vec<ChunkHit> = inner
            .chunks
            .values()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                Some(ChunkHit {
                    document_id: chunk.document_id,
                    chunk_id: chunk.id,
                    distance: Self::cosine_distance(vector, embedding),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryCorpus {
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.inner.read().await.documents.get(&id).cloned())
    }

    async fn get_documents(&self, ids: &[Uuid]) -> Result<Vec<Document>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.documents.get(id).cloned())
            .collect())
    }

    async fn find_document_by_external_id(&self, external_id: &str) -> Result<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents_by_external
            .get(external_id)
            .and_then(|id| inner.documents.get(id))
            .cloned())
    }

    async fn put_document(&self, document: Document) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .documents_by_external
            .insert(document.external_id.clone(), document.id);
        inner.documents.insert(document.id, document);
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let inner = self.inner.read().await;
        let mut documents: Vec<Document> = inner.documents.values().cloned().collect();
        documents.sort_by_key(|d| d.id);
        Ok(documents)
    }

    async fn find_author_by_key(&self, key: &str) -> Result<Option<Author>> {
        let inner = self.inner.read().await;
        Ok(inner
            .authors_by_key
            .get(key)
            .and_then(|id| inner.authors.get(id))
            .cloned())
    }

    async fn put_author(&self, key: &str, author: Author) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.authors_by_key.insert(key.to_string(), author.id);
        inner.authors.insert(author.id, author);
        Ok(())
    }

    async fn find_topic_by_key(&self, key: &str) -> Result<Option<Topic>> {
        let inner = self.inner.read().await;
        Ok(inner
            .topics_by_key
            .get(key)
            .and_then(|id| inner.topics.get(id))
            .cloned())
    }

    async fn put_topic(&self, key: &str, topic: Topic) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.topics_by_key.insert(key.to_string(), topic.id);
        inner.topics.insert(topic.id, topic);
        Ok(())
    }

    async fn get_authors(&self, ids: &[Uuid]) -> Result<Vec<Author>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.authors.get(id).cloned())
            .collect())
    }

    async fn get_topics(&self, ids: &[Uuid]) -> Result<Vec<Topic>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.topics.get(id).cloned())
            .collect())
    }

    async fn get_chunk(&self, id: Uuid) -> Result<Option<Chunk>> {
        Ok(self.inner.read().await.chunks.get(&id).cloned())
    }

    async fn replace_chunks(&self, document_id: Uuid, chunks: Vec<Chunk>) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Retire the previous generation
        if let Some(old) = inner.chunks_by_document.remove(&document_id) {
            for chunk_id in old {
                inner.chunks.remove(&chunk_id);
            }
        }

        let ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
        for chunk in chunks {
            inner.chunks.insert(chunk.id, chunk);
        }
        inner.chunks_by_document.insert(document_id, ids);
        Ok(())
    }

    async fn counts(&self) -> Result<CorpusCounts> {
        let inner = self.inner.read().await;
        Ok(CorpusCounts {
            documents: inner.documents.len(),
            authors: inner.authors.len(),
            topics: inner.topics.len(),
            chunks: inner.chunks.len(),
        })
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryCorpus {
    async fn adjacent(&self, node: NodeId, kinds: &[EdgeKind]) -> Result<Vec<GraphEdge>> {
        self.graph_guard()?;
        let inner = self.inner.read().await;
        let mut edges: Vec<GraphEdge> = inner
            .adjacency
            .get(&node)
            .map(|list| {
                list.iter()
                    .filter(|e| kinds.contains(&e.kind))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        // Deterministic expansion order regardless of insertion history
        edges.sort_by_key(|e| (e.from, e.to));
        Ok(edges)
    }

    async fn metrics(&self, node: NodeId) -> Result<Option<NodeMetrics>> {
        self.graph_guard()?;
        Ok(self.inner.read().await.metrics.get(&node).copied())
    }

    async fn max_centrality(&self) -> Result<f64> {
        self.graph_guard()?;
        let inner = self.inner.read().await;
        Ok(inner
            .metrics
            .values()
            .map(|m| m.centrality)
            .fold(0.0, f64::max))
    }

    async fn all_edges(&self, kinds: &[EdgeKind]) -> Result<Vec<GraphEdge>> {
        self.graph_guard()?;
        let inner = self.inner.read().await;
        let mut edges: Vec<GraphEdge> = inner
            .edges
            .iter()
            .filter(|e| kinds.contains(&e.kind))
            .copied()
            .collect();
        edges.sort_by_key(|e| (e.from, e.to));
        Ok(edges)
    }

    async fn replace_document_edges(
        &self,
        document_id: Uuid,
        author_ids: &[Uuid],
        topic_ids: &[Uuid],
    ) -> Result<()> {
        self.graph_guard()?;
        let mut inner = self.inner.write().await;
        let paper = NodeId::paper(document_id);

        let stale: Vec<GraphEdge> = inner
            .adjacency
            .get(&paper)
            .map(|list| {
                list.iter()
                    .filter(|e| matches!(e.kind, EdgeKind::Wrote | EdgeKind::HasTopic))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        let previous_authors: Vec<Uuid> = stale
            .iter()
            .filter(|e| e.kind == EdgeKind::Wrote)
            .map(|e| e.from.id)
            .collect();
        for edge in &stale {
            inner.remove_edge(edge);
        }

        for author_id in author_ids {
            inner.insert_edge(GraphEdge {
                from: NodeId::author(*author_id),
                to: paper,
                kind: EdgeKind::Wrote,
            });
        }
        for topic_id in topic_ids {
            inner.insert_edge(GraphEdge {
                from: paper,
                to: NodeId::topic(*topic_id),
                kind: EdgeKind::HasTopic,
            });
        }

        // Recompute derived collaborations for every pair touched by this
        // document's previous or current author set. A pair collaborates
        // iff some paper still carries WROTE edges from both.
        let mut affected: Vec<Uuid> = previous_authors;
        affected.extend_from_slice(author_ids);
        affected.sort();
        affected.dedup();
        for (i, a) in affected.iter().enumerate() {
            for b in affected.iter().skip(i + 1) {
                let shared = Self::share_a_paper(&inner, *a, *b);
                let edge = GraphEdge {
                    from: NodeId::author((*a).min(*b)),
                    to: NodeId::author((*a).max(*b)),
                    kind: EdgeKind::CollaboratedWith,
                };
                if shared {
                    inner.insert_edge(edge);
                } else {
                    inner.remove_edge(&edge);
                }
            }
        }
        Ok(())
    }

    async fn put_metrics(&self, metrics: Vec<(NodeId, NodeMetrics)>) -> Result<()> {
        self.graph_guard()?;
        let mut inner = self.inner.write().await;
        for (node, value) in metrics {
            inner.metrics.insert(node, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SecurityLevel;

    fn doc(external_id: &str) -> Document {
        Document {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            title: "Test".into(),
            abstract_text: String::new(),
            published_date: None,
            doi: None,
            security_level: SecurityLevel::Public,
            author_ids: vec![],
            topic_ids: vec![],
        }
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let corpus = MemoryCorpus::new();
        let document = doc("W1");
        let id = document.id;
        corpus.put_document(document).await.unwrap();

        let found = corpus.find_document_by_external_id("W1").await.unwrap();
        assert_eq!(found.map(|d| d.id), Some(id));
    }

    #[tokio::test]
    async fn test_nearest_chunks_ordering() {
        let corpus = MemoryCorpus::new();
        let document = doc("W1");
        let doc_id = document.id;
        corpus.put_document(document).await.unwrap();

        let close = Chunk {
            id: Uuid::from_u128(1),
            document_id: doc_id,
            ordinal: 0,
            text: "close".into(),
            embedding: Some(vec![1.0, 0.0]),
        };
        let far = Chunk {
            id: Uuid::from_u128(2),
            document_id: doc_id,
            ordinal: 1,
            text: "far".into(),
            embedding: Some(vec![0.0, 1.0]),
        };
        corpus.replace_chunks(doc_id, vec![far, close]).await.unwrap();

        let hits = corpus.nearest_chunks(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, Uuid::from_u128(1));
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_replace_chunks_retires_old_generation() {
        let corpus = MemoryCorpus::new();
        let doc_id = Uuid::new_v4();

        let first = Chunk {
            id: Uuid::from_u128(10),
            document_id: doc_id,
            ordinal: 0,
            text: "v1".into(),
            embedding: Some(vec![1.0]),
        };
        corpus.replace_chunks(doc_id, vec![first]).await.unwrap();

        let second = Chunk {
            id: Uuid::from_u128(11),
            document_id: doc_id,
            ordinal: 0,
            text: "v2".into(),
            embedding: Some(vec![1.0]),
        };
        corpus.replace_chunks(doc_id, vec![second]).await.unwrap();

        assert!(corpus.get_chunk(Uuid::from_u128(10)).await.unwrap().is_none());
        assert!(corpus.get_chunk(Uuid::from_u128(11)).await.unwrap().is_some());
        assert_eq!(corpus.counts().await.unwrap().chunks, 1);
    }

    #[tokio::test]
    async fn test_edge_sync_is_exact() {
        let corpus = MemoryCorpus::new();
        let doc_id = Uuid::new_v4();
        let a1 = Uuid::from_u128(1);
        let a2 = Uuid::from_u128(2);
        let t1 = Uuid::from_u128(3);

        corpus
            .replace_document_edges(doc_id, &[a1, a2], &[t1])
            .await
            .unwrap();
        let wrote = corpus
            .adjacent(NodeId::paper(doc_id), &[EdgeKind::Wrote])
            .await
            .unwrap();
        assert_eq!(wrote.len(), 2);

        // Dropping a2 removes its edge
        corpus
            .replace_document_edges(doc_id, &[a1], &[t1])
            .await
            .unwrap();
        let wrote = corpus
            .adjacent(NodeId::paper(doc_id), &[EdgeKind::Wrote])
            .await
            .unwrap();
        assert_eq!(wrote.len(), 1);
        assert_eq!(wrote[0].from, NodeId::author(a1));

        // Derived collaboration disappears with the shared paper
        let collabs = corpus
            .adjacent(NodeId::author(a1), &[EdgeKind::CollaboratedWith])
            .await
            .unwrap();
        assert!(collabs.is_empty());
    }

    #[tokio::test]
    async fn test_graph_outage_simulation() {
        let corpus = MemoryCorpus::new();
        corpus.set_graph_available(false);

        let err = corpus
            .adjacent(NodeId::paper(Uuid::new_v4()), &[EdgeKind::Wrote])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::GraphStoreUnavailable { .. }));

        corpus.set_graph_available(true);
        assert!(corpus.max_centrality().await.is_ok());
    }
}
