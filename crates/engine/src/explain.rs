//! Result explanations
//!
//! Reconstructs a shortest path from a synthetic query node to each ranked
//! document through the expansion subgraph, and renders the human-readable
//! "why" line. The query node is connected by MATCHED edges to every paper
//! the semantic pass admitted, so a seed paper always explains itself
//! with a single MATCHED step.

use scholargraph_common::errors::{EngineError, Result};
use scholargraph_common::model::{EdgeKind, GraphEdge, NodeId, PathStep, ScoreBreakdown};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

const QUERY_LABEL: &str = "Query";

/// A reconstructed explanation path
#[derive(Debug, Clone, PartialEq)]
pub struct PathExplanation {
    pub steps: Vec<PathStep>,
    /// Graph edges traversed beyond the matched paper; a directly matched
    /// paper reports 0
    pub hops: u32,
}

fn edge_label(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Wrote => "WROTE",
        EdgeKind::HasTopic => "HAS_TOPIC",
        EdgeKind::CollaboratedWith => "COLLABORATED_WITH",
    }
}

fn node_label(node: NodeId, labels: &HashMap<NodeId, String>) -> String {
    labels
        .get(&node)
        .cloned()
        .unwrap_or_else(|| node.id.to_string())
}

/// Find the shortest path from the query node to `target` through the
/// expansion subgraph. Seeds are the papers the query node matched
/// directly; the walk through the subgraph is undirected.
pub fn shortest_path(
    target: Uuid,
    seeds: &[Uuid],
    subgraph: &[GraphEdge],
    labels: &HashMap<NodeId, String>,
) -> Result<PathExplanation> {
    let target_node = NodeId::paper(target);

    // A directly matched paper explains itself in one hop
    if seeds.contains(&target) {
        return Ok(PathExplanation {
            steps: vec![PathStep {
                from: QUERY_LABEL.to_string(),
                edge: "MATCHED".to_string(),
                to: node_label(target_node, labels),
            }],
            hops: 0,
        });
    }

    let mut adjacency: HashMap<NodeId, Vec<GraphEdge>> = HashMap::new();
    for edge in subgraph {
        adjacency.entry(edge.from).or_default().push(*edge);
        adjacency.entry(edge.to).or_default().push(*edge);
    }

    // Multi-source BFS from every seed, parents recorded for rebuild
    let mut parent: HashMap<NodeId, (NodeId, GraphEdge)> = HashMap::new();
    let mut origin: HashMap<NodeId, Uuid> = HashMap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for &seed in seeds {
        let node = NodeId::paper(seed);
        if origin.insert(node, seed).is_none() {
            queue.push_back(node);
        }
    }

    while let Some(node) = queue.pop_front() {
        if node == target_node {
            break;
        }
        let Some(edges) = adjacency.get(&node) else {
            continue;
        };
        let seed = origin[&node];
        for edge in edges {
            let neighbor = if edge.from == node { edge.to } else { edge.from };
            if origin.contains_key(&neighbor) {
                continue;
            }
            origin.insert(neighbor, seed);
            parent.insert(neighbor, (node, *edge));
            queue.push_back(neighbor);
        }
    }

    if !origin.contains_key(&target_node) {
        return Err(EngineError::NoPathFound {
            target: target.to_string(),
        });
    }

    // Walk parents back to the seed, then prepend the MATCHED edge
    let mut edges_back: Vec<(NodeId, GraphEdge)> = Vec::new();
    let mut cursor = target_node;
    while let Some((prev, edge)) = parent.get(&cursor) {
        edges_back.push((*prev, *edge));
        cursor = *prev;
    }
    edges_back.reverse();

    let mut steps = vec![PathStep {
        from: QUERY_LABEL.to_string(),
        edge: "MATCHED".to_string(),
        to: node_label(cursor, labels),
    }];
    for (from, edge) in &edges_back {
        let to = if edge.from == *from { edge.to } else { edge.from };
        steps.push(PathStep {
            from: node_label(*from, labels),
            edge: edge_label(edge.kind).to_string(),
            to: node_label(to, labels),
        });
    }

    // The synthetic MATCHED edge does not count toward hop distance
    let hops = (steps.len() - 1) as u32;
    Ok(PathExplanation { steps, hops })
}

/// Render the one-line ranking rationale from the score breakdown.
pub fn why_matched(breakdown: &ScoreBreakdown, topics: &[String], has_path: bool) -> String {
    let normalized = breakdown.normalized();
    if !has_path && normalized.semantic_relevance < 0.05 && normalized.query_alignment < 0.05 {
        return "Ranked by overall relevance to the query.".to_string();
    }

    let semantic_label = if normalized.semantic_relevance >= 0.75 {
        "high semantic relevance"
    } else if normalized.semantic_relevance >= 0.4 {
        "solid semantic relevance"
    } else {
        "partial semantic relevance"
    };

    let mut clauses = vec![semantic_label.to_string()];
    if normalized.query_alignment >= 0.5 {
        clauses.push("strong query-term alignment".to_string());
    }
    if normalized.graph_authority >= 0.5 {
        clauses.push("an authoritative author neighborhood".to_string());
    }
    if let Some(topic) = topics.first() {
        clauses.push(format!("coverage of topics like {topic}"));
    }

    match clauses.len() {
        1 => format!("Ranked for {}.", clauses[0]),
        2 => format!("Ranked for {} and {}.", clauses[0], clauses[1]),
        _ => format!(
            "Ranked for {}, and {}.",
            clauses[..clauses.len() - 1].join(", "),
            clauses[clauses.len() - 1]
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: NodeId, to: NodeId, kind: EdgeKind) -> GraphEdge {
        GraphEdge { from, to, kind }
    }

    #[test]
    fn test_seed_paper_has_zero_hop_distance() {
        let target = Uuid::from_u128(1);
        let labels = HashMap::from([(NodeId::paper(target), "Seed Paper".to_string())]);
        let explanation = shortest_path(target, &[target], &[], &labels).unwrap();
        assert_eq!(explanation.hops, 0);
        assert_eq!(explanation.steps[0].edge, "MATCHED");
        assert_eq!(explanation.steps[0].to, "Seed Paper");
    }

    #[test]
    fn test_path_through_shared_author() {
        // seed paper -> author -> target paper
        let seed = Uuid::from_u128(1);
        let target = Uuid::from_u128(2);
        let author = Uuid::from_u128(10);
        let subgraph = vec![
            edge(NodeId::author(author), NodeId::paper(seed), EdgeKind::Wrote),
            edge(NodeId::author(author), NodeId::paper(target), EdgeKind::Wrote),
        ];
        let labels = HashMap::from([
            (NodeId::paper(seed), "Seed".to_string()),
            (NodeId::paper(target), "Target".to_string()),
            (NodeId::author(author), "Ada Lovelace".to_string()),
        ]);

        let explanation = shortest_path(target, &[seed], &subgraph, &labels).unwrap();
        assert_eq!(explanation.hops, 2);
        assert_eq!(explanation.steps[0].to, "Seed");
        assert_eq!(explanation.steps[1].edge, "WROTE");
        assert_eq!(explanation.steps[2].to, "Target");
    }

    #[test]
    fn test_unreachable_target_is_no_path() {
        let err = shortest_path(Uuid::from_u128(9), &[Uuid::from_u128(1)], &[], &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoPathFound { .. }));
    }

    #[test]
    fn test_why_matched_registers() {
        let strong = ScoreBreakdown {
            semantic_relevance: 0.9,
            query_alignment: 0.8,
            graph_authority: 0.7,
            graph_centrality: 0.2,
        };
        let line = why_matched(&strong, &["Network Slicing".to_string()], true);
        assert!(line.contains("high semantic relevance"));
        assert!(line.contains("Network Slicing"));

        let empty = ScoreBreakdown::default();
        assert_eq!(
            why_matched(&empty, &[], false),
            "Ranked by overall relevance to the query."
        );
    }
}
