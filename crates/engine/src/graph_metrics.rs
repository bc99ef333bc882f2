//! Batch graph metrics
//!
//! Recomputes per-node authority and centrality over the co-authorship
//! projection. Authors get PageRank authority and degree centrality;
//! papers and topics inherit the mean of their adjacent authors. Runs out
//! of band, so the retrieval path only ever reads precomputed values.

use scholargraph_common::errors::Result;
use scholargraph_common::model::{EdgeKind, NodeId, NodeKind, NodeMetrics};
use scholargraph_common::store::GraphStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// PageRank parameters
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    /// Damping factor
    pub damping: f64,
    pub max_iterations: usize,
    /// Convergence threshold on the largest per-node delta
    pub epsilon: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            epsilon: 1e-6,
        }
    }
}

/// Recomputes and persists node metrics
pub struct GraphMetricsEngine {
    graph: Arc<dyn GraphStore>,
    config: PageRankConfig,
}

impl GraphMetricsEngine {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self {
            graph,
            config: PageRankConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PageRankConfig) -> Self {
        self.config = config;
        self
    }

    /// Recompute metrics for every node reachable from the stored edges
    /// and persist them in one batch.
    pub async fn recompute(&self) -> Result<usize> {
        let wrote = self.graph.all_edges(&[EdgeKind::Wrote]).await?;
        let collaborations = self.graph.all_edges(&[EdgeKind::CollaboratedWith]).await?;
        let topical = self.graph.all_edges(&[EdgeKind::HasTopic]).await?;

        // Undirected co-authorship projection over authors
        let mut authors: HashSet<Uuid> = HashSet::new();
        let mut neighbors: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        for edge in &wrote {
            authors.insert(edge.from.id);
        }
        for edge in &collaborations {
            authors.insert(edge.from.id);
            authors.insert(edge.to.id);
            neighbors.entry(edge.from.id).or_default().insert(edge.to.id);
            neighbors.entry(edge.to.id).or_default().insert(edge.from.id);
        }

        let authority = self.pagerank(&authors, &neighbors);
        let centrality = degree_centrality(&authors, &neighbors);

        let mut batch: Vec<(NodeId, NodeMetrics)> = authors
            .iter()
            .map(|&id| {
                (
                    NodeId::author(id),
                    NodeMetrics {
                        authority: authority.get(&id).copied().unwrap_or(0.0),
                        centrality: centrality.get(&id).copied().unwrap_or(0.0),
                    },
                )
            })
            .collect();

        // Papers inherit the mean of their authors
        let mut paper_authors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for edge in &wrote {
            paper_authors.entry(edge.to.id).or_default().push(edge.from.id);
        }
        for (&paper, author_ids) in &paper_authors {
            batch.push((
                NodeId::paper(paper),
                mean_metrics(author_ids, &authority, &centrality),
            ));
        }

        // Topics inherit the mean over all authors of papers carrying them
        let mut topic_authors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for edge in &topical {
            let (paper, topic) = match (edge.from.kind, edge.to.kind) {
                (NodeKind::Paper, NodeKind::Topic) => (edge.from.id, edge.to.id),
                (NodeKind::Topic, NodeKind::Paper) => (edge.to.id, edge.from.id),
                _ => continue,
            };
            if let Some(author_ids) = paper_authors.get(&paper) {
                topic_authors
                    .entry(topic)
                    .or_default()
                    .extend(author_ids.iter().copied());
            }
        }
        for (&topic, author_ids) in &topic_authors {
            batch.push((
                NodeId::topic(topic),
                mean_metrics(author_ids, &authority, &centrality),
            ));
        }

        let count = batch.len();
        self.graph.put_metrics(batch).await?;
        info!(nodes = count, "Graph metrics recomputed");
        metrics::gauge!("graph_metrics_nodes").set(count as f64);
        Ok(count)
    }

    /// Max-normalized PageRank over the undirected collaboration graph
    fn pagerank(
        &self,
        nodes: &HashSet<Uuid>,
        neighbors: &HashMap<Uuid, HashSet<Uuid>>,
    ) -> HashMap<Uuid, f64> {
        let n = nodes.len();
        if n == 0 {
            return HashMap::new();
        }

        let n_f64 = n as f64;
        let damping = self.config.damping;
        let teleport = (1.0 - damping) / n_f64;
        let mut scores: HashMap<Uuid, f64> = nodes.iter().map(|&id| (id, 1.0 / n_f64)).collect();

        for _ in 0..self.config.max_iterations {
            let mut next: HashMap<Uuid, f64> = HashMap::with_capacity(n);
            let mut max_diff = 0.0f64;

            for &node in nodes {
                let inbound: f64 = neighbors
                    .get(&node)
                    .map(|adjacent| {
                        adjacent
                            .iter()
                            .map(|peer| {
                                let peer_score = scores.get(peer).copied().unwrap_or(0.0);
                                let peer_degree =
                                    neighbors.get(peer).map(|s| s.len()).unwrap_or(1).max(1);
                                peer_score / peer_degree as f64
                            })
                            .sum()
                    })
                    .unwrap_or(0.0);

                let score = teleport + damping * inbound;
                let old = scores.get(&node).copied().unwrap_or(0.0);
                max_diff = max_diff.max((score - old).abs());
                next.insert(node, score);
            }

            scores = next;
            if max_diff < self.config.epsilon {
                break;
            }
        }

        let max_score = scores.values().copied().fold(0.0f64, f64::max);
        if max_score > 0.0 {
            for score in scores.values_mut() {
                *score /= max_score;
            }
        }
        scores
    }
}

/// Degree of each node over n-1, the standard normalization
fn degree_centrality(
    nodes: &HashSet<Uuid>,
    neighbors: &HashMap<Uuid, HashSet<Uuid>>,
) -> HashMap<Uuid, f64> {
    let n = nodes.len();
    if n <= 1 {
        return nodes.iter().map(|&id| (id, 0.0)).collect();
    }
    let denominator = (n - 1) as f64;
    nodes
        .iter()
        .map(|&id| {
            let degree = neighbors.get(&id).map(|s| s.len()).unwrap_or(0);
            (id, degree as f64 / denominator)
        })
        .collect()
}

fn mean_metrics(
    author_ids: &[Uuid],
    authority: &HashMap<Uuid, f64>,
    centrality: &HashMap<Uuid, f64>,
) -> NodeMetrics {
    if author_ids.is_empty() {
        return NodeMetrics::default();
    }
    let count = author_ids.len() as f64;
    NodeMetrics {
        authority: author_ids
            .iter()
            .map(|id| authority.get(id).copied().unwrap_or(0.0))
            .sum::<f64>()
            / count,
        centrality: author_ids
            .iter()
            .map(|id| centrality.get(id).copied().unwrap_or(0.0))
            .sum::<f64>()
            / count,
    }
}
