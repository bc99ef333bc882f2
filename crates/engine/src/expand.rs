//! Bounded graph expansion
//!
//! Walks the knowledge graph outward from each candidate paper, hop by
//! hop, collecting authority mass from the neighborhood. Both the hop
//! limit and the per-hop fanout cap bound the walk, so a hub node cannot
//! blow up a query. A graph-store outage degrades both graph signals to
//! zero without failing the request.

use scholargraph_common::errors::Result;
use scholargraph_common::model::{EdgeKind, GraphEdge, NodeId, NodeKind};
use scholargraph_common::store::GraphStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Edge kinds the authority walk traverses. Collaborator edges join the
/// explainability subgraph but never feed the walk.
const TRAVERSAL_KINDS: [EdgeKind; 2] = [EdgeKind::Wrote, EdgeKind::HasTopic];

/// Graph-derived signals for one candidate document
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GraphSignals {
    pub authority: f64,
    pub centrality: f64,
}

/// Result of expanding all candidates
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub signals: HashMap<Uuid, GraphSignals>,
    /// Every edge traversed, kept for path reconstruction
    pub subgraph: Vec<GraphEdge>,
    /// True when the graph store was unavailable and signals are zeroed
    pub degraded: bool,
}

/// Per-candidate BFS expander over the knowledge graph
pub struct GraphExpander {
    graph: Arc<dyn GraphStore>,
    hop_limit: u32,
    fanout_cap: usize,
}

impl GraphExpander {
    pub fn new(graph: Arc<dyn GraphStore>, hop_limit: u32, fanout_cap: usize) -> Self {
        Self {
            graph,
            hop_limit,
            fanout_cap,
        }
    }

    /// Expand every seed document and compute normalized graph signals.
    pub async fn expand(&self, seed_documents: &[Uuid]) -> Result<Expansion> {
        match self.try_expand(seed_documents).await {
            Ok(expansion) => Ok(expansion),
            Err(err) if err.is_degradable() => {
                warn!(error = %err, "Graph expansion degraded, zeroing graph signals");
                metrics::counter!("graph_expansion_degraded_total").increment(1);
                Ok(Expansion {
                    signals: seed_documents
                        .iter()
                        .map(|id| (*id, GraphSignals::default()))
                        .collect(),
                    subgraph: Vec::new(),
                    degraded: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn try_expand(&self, seed_documents: &[Uuid]) -> Result<Expansion> {
        let max_centrality = self.graph.max_centrality().await?;
        let mut raw_authority: HashMap<Uuid, f64> = HashMap::new();
        let mut signals: HashMap<Uuid, GraphSignals> = HashMap::new();
        let mut subgraph: HashSet<GraphEdge> = HashSet::new();

        for &document_id in seed_documents {
            let seed = NodeId::paper(document_id);
            let mut authority = self.node_authority(seed).await?;

            let mut visited: HashSet<NodeId> = HashSet::from([seed]);
            let mut frontier: Vec<NodeId> = vec![seed];

            for hop in 1..=self.hop_limit {
                let mut next: Vec<NodeId> = Vec::new();
                let decay = 1.0 / (1.0 + f64::from(hop));

                for node in &frontier {
                    for edge in self.graph.adjacent(*node, &TRAVERSAL_KINDS).await? {
                        let neighbor = if edge.from == *node { edge.to } else { edge.from };
                        if visited.contains(&neighbor) {
                            continue;
                        }
                        if next.len() >= self.fanout_cap {
                            break;
                        }
                        visited.insert(neighbor);
                        next.push(neighbor);
                        subgraph.insert(edge);
                        authority += self.node_authority(neighbor).await? * decay;
                    }
                }
                if next.is_empty() {
                    break;
                }
                frontier = next;
            }

            // Collaborator edges of visited authors enrich the subgraph
            // without contributing authority
            for node in &visited {
                if node.kind == NodeKind::Author {
                    for edge in self
                        .graph
                        .adjacent(*node, &[EdgeKind::CollaboratedWith])
                        .await?
                    {
                        subgraph.insert(edge);
                    }
                }
            }

            raw_authority.insert(document_id, authority);

            let centrality = match self.graph.metrics(seed).await? {
                Some(metrics) if max_centrality > 0.0 => metrics.centrality / max_centrality,
                _ => 0.0,
            };
            signals.insert(
                document_id,
                GraphSignals {
                    authority: 0.0,
                    centrality: centrality.clamp(0.0, 1.0),
                },
            );
        }

        // Per-query max normalization of accumulated authority
        let max_authority = raw_authority.values().copied().fold(0.0, f64::max);
        if max_authority > 0.0 {
            for (document_id, raw) in &raw_authority {
                if let Some(entry) = signals.get_mut(document_id) {
                    entry.authority = (raw / max_authority).clamp(0.0, 1.0);
                }
            }
        }

        let mut subgraph: Vec<GraphEdge> = subgraph.into_iter().collect();
        subgraph.sort_by_key(|e| (e.from, e.to));

        debug!(
            seeds = seed_documents.len(),
            edges = subgraph.len(),
            "Graph expansion complete"
        );
        Ok(Expansion {
            signals,
            subgraph,
            degraded: false,
        })
    }

    async fn node_authority(&self, node: NodeId) -> Result<f64> {
        Ok(self
            .graph
            .metrics(node)
            .await?
            .map(|m| m.authority)
            .unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholargraph_common::model::NodeMetrics;
    use scholargraph_common::store::MemoryCorpus;

    async fn seed_graph(corpus: &MemoryCorpus) -> (Uuid, Uuid) {
        // Two papers: one written by a high-authority author, one isolated
        let strong = Uuid::from_u128(1);
        let weak = Uuid::from_u128(2);
        let author = Uuid::from_u128(10);

        corpus
            .replace_document_edges(strong, &[author], &[])
            .await
            .unwrap();
        corpus
            .put_metrics(vec![
                (
                    NodeId::author(author),
                    NodeMetrics {
                        authority: 0.9,
                        centrality: 0.8,
                    },
                ),
                (
                    NodeId::paper(strong),
                    NodeMetrics {
                        authority: 0.5,
                        centrality: 0.4,
                    },
                ),
            ])
            .await
            .unwrap();
        (strong, weak)
    }

    #[tokio::test]
    async fn test_connected_paper_outranks_isolated() {
        let corpus = Arc::new(MemoryCorpus::new());
        let (strong, weak) = seed_graph(&corpus).await;

        let expander = GraphExpander::new(corpus.clone(), 2, 32);
        let expansion = expander.expand(&[strong, weak]).await.unwrap();

        let strong_signals = expansion.signals[&strong];
        let weak_signals = expansion.signals[&weak];
        assert!(strong_signals.authority > weak_signals.authority);
        assert_eq!(strong_signals.authority, 1.0);
        assert_eq!(weak_signals.authority, 0.0);
        assert!(!expansion.subgraph.is_empty());
    }

    #[tokio::test]
    async fn test_hop_limit_bounds_walk() {
        let corpus = Arc::new(MemoryCorpus::new());
        // Chain: paper1 - author - paper2 - author2
        let p1 = Uuid::from_u128(1);
        let p2 = Uuid::from_u128(2);
        let a1 = Uuid::from_u128(10);
        let a2 = Uuid::from_u128(11);
        corpus.replace_document_edges(p1, &[a1], &[]).await.unwrap();
        corpus.replace_document_edges(p2, &[a1, a2], &[]).await.unwrap();

        let expander = GraphExpander::new(corpus.clone(), 1, 32);
        let expansion = expander.expand(&[p1]).await.unwrap();
        // One hop reaches a1 only
        let reached: HashSet<NodeId> = expansion
            .subgraph
            .iter()
            .flat_map(|e| [e.from, e.to])
            .collect();
        assert!(reached.contains(&NodeId::author(a1)));
        assert!(!reached.contains(&NodeId::paper(p2)));
    }

    #[tokio::test]
    async fn test_outage_degrades_to_zero_signals() {
        let corpus = Arc::new(MemoryCorpus::new());
        let (strong, weak) = seed_graph(&corpus).await;
        corpus.set_graph_available(false);

        let expander = GraphExpander::new(corpus.clone(), 2, 32);
        let expansion = expander.expand(&[strong, weak]).await.unwrap();
        assert!(expansion.degraded);
        assert_eq!(expansion.signals[&strong], GraphSignals::default());
        assert!(expansion.subgraph.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_cap_limits_neighbors() {
        let corpus = Arc::new(MemoryCorpus::new());
        let paper = Uuid::from_u128(1);
        let authors: Vec<Uuid> = (10..30).map(Uuid::from_u128).collect();
        corpus
            .replace_document_edges(paper, &authors, &[])
            .await
            .unwrap();

        let expander = GraphExpander::new(corpus.clone(), 1, 5);
        let expansion = expander.expand(&[paper]).await.unwrap();
        let wrote = expansion
            .subgraph
            .iter()
            .filter(|e| e.kind == EdgeKind::Wrote)
            .count();
        assert_eq!(wrote, 5);
    }

    #[tokio::test]
    async fn test_collaborator_edges_join_subgraph_without_traversal() {
        let corpus = Arc::new(MemoryCorpus::new());
        let p1 = Uuid::from_u128(1);
        let p2 = Uuid::from_u128(2);
        let a1 = Uuid::from_u128(10);
        let a2 = Uuid::from_u128(11);
        corpus.replace_document_edges(p1, &[a1], &[]).await.unwrap();
        corpus.replace_document_edges(p2, &[a1, a2], &[]).await.unwrap();

        let expander = GraphExpander::new(corpus.clone(), 1, 32);
        let expansion = expander.expand(&[p1]).await.unwrap();

        // The derived collaboration shows up for path rendering
        assert!(expansion
            .subgraph
            .iter()
            .any(|e| e.kind == EdgeKind::CollaboratedWith));
        // but the walk itself stopped at the author and never pulled in
        // the collaborator's paper
        assert!(!expansion
            .subgraph
            .iter()
            .any(|e| e.kind == EdgeKind::Wrote && e.to == NodeId::paper(p2)));
    }
}
