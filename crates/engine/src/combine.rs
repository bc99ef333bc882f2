//! Score combination
//!
//! Folds the four component signals into one relevance score and defines
//! the total order used for ranking. Equal weighted sums break ties on
//! semantic relevance, then document id, so a query always produces the
//! same page layout.

use scholargraph_common::config::Weights;
use scholargraph_common::model::ScoreBreakdown;
use std::cmp::Ordering;
use uuid::Uuid;

/// Weighted combiner over normalized component scores
#[derive(Debug, Clone, Copy)]
pub struct ScoreCombiner {
    weights: Weights,
}

impl ScoreCombiner {
    pub fn new(weights: Weights) -> Self {
        Self { weights }
    }

    /// Weighted sum of the normalized breakdown. Always in [0,1] when the
    /// weights sum to 1.
    pub fn combine(&self, breakdown: ScoreBreakdown) -> f64 {
        let normalized = breakdown.normalized();
        let score = self.weights.semantic * normalized.semantic_relevance
            + self.weights.alignment * normalized.query_alignment
            + self.weights.authority * normalized.graph_authority
            + self.weights.centrality * normalized.graph_centrality;
        score.clamp(0.0, 1.0)
    }
}

/// Total ranking order: relevance descending, semantic relevance
/// descending, document id ascending.
pub fn compare(
    a: (f64, f64, Uuid),
    b: (f64, f64, Uuid),
) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
        .then_with(|| a.2.cmp(&b.2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(semantic: f64, alignment: f64, authority: f64, centrality: f64) -> ScoreBreakdown {
        ScoreBreakdown {
            semantic_relevance: semantic,
            query_alignment: alignment,
            graph_authority: authority,
            graph_centrality: centrality,
        }
    }

    #[test]
    fn test_weighted_combination() {
        let combiner = ScoreCombiner::new(Weights::default());
        let score = combiner.combine(breakdown(1.0, 1.0, 1.0, 1.0));
        assert!((score - 1.0).abs() < 1e-9);

        let semantic_only = combiner.combine(breakdown(1.0, 0.0, 0.0, 0.0));
        assert!((semantic_only - 0.40).abs() < 1e-9);
    }

    #[test]
    fn test_nan_components_do_not_poison_score() {
        let combiner = ScoreCombiner::new(Weights::default());
        let score = combiner.combine(breakdown(f64::NAN, 0.5, 0.0, 0.0));
        assert!((score - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_score_bounded_for_all_valid_weights() {
        let configs = [
            (1.0, 0.0, 0.0, 0.0),
            (0.0, 1.0, 0.0, 0.0),
            (0.0, 0.0, 1.0, 0.0),
            (0.0, 0.0, 0.0, 1.0),
            (0.25, 0.25, 0.25, 0.25),
            (0.40, 0.25, 0.20, 0.15),
            (0.7, 0.1, 0.1, 0.1),
        ];
        let breakdowns = [
            breakdown(0.0, 0.0, 0.0, 0.0),
            breakdown(1.0, 1.0, 1.0, 1.0),
            breakdown(5.0, -3.0, 0.5, 0.5),
            breakdown(f64::NAN, f64::NAN, f64::NAN, f64::NAN),
            breakdown(f64::INFINITY, 0.0, f64::NEG_INFINITY, 1.0),
        ];

        for (semantic, alignment, authority, centrality) in configs {
            let weights = Weights {
                semantic,
                alignment,
                authority,
                centrality,
            };
            weights.validate().unwrap();
            let combiner = ScoreCombiner::new(weights);
            for input in breakdowns {
                let score = combiner.combine(input);
                assert!(
                    (0.0..=1.0).contains(&score),
                    "score {score} out of range for weights {weights:?} and {input:?}"
                );
            }
        }
    }

    #[test]
    fn test_order_is_total_and_deterministic() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        // Higher relevance first
        assert_eq!(compare((0.9, 0.1, low), (0.5, 0.9, high)), Ordering::Less);
        // Tie on relevance breaks on semantic
        assert_eq!(compare((0.5, 0.8, low), (0.5, 0.3, high)), Ordering::Less);
        // Full tie breaks on id, ascending
        assert_eq!(compare((0.5, 0.5, low), (0.5, 0.5, high)), Ordering::Less);
        assert_eq!(compare((0.5, 0.5, high), (0.5, 0.5, low)), Ordering::Greater);
    }
}
