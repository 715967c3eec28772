//! Rating prediction: a double-centered baseline plus a similarity-weighted
//! residual over the user's rated neighbors of the target item.

use crate::context::RecommenderContext;
use meeple_core::error::MeepleResult;
use serde::Serialize;
use tracing::debug;

/// Why a prediction fell back to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionFallback {
    /// The neighbor weights summed to zero or to a non-number.
    NoConfidentNeighbors,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub user: String,
    pub item: String,
    pub value: f64,
    pub baseline: f64,
    pub neighbors_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<PredictionFallback>,
}

impl RecommenderContext {
    /// `global_mean + (user_mean - global_mean) + (item_mean - global_mean)`.
    pub fn baseline(&self, user: &str, item: &str) -> MeepleResult<f64> {
        let g = self.global_mean();
        let user_mean = self.profile(user)?.avg;
        let item_mean = self.item_stats(item)?.avg;
        Ok(g + (user_mean - g) + (item_mean - g))
    }

    /// Predict `user`'s rating of `item`.
    ///
    /// Neighbors are ranked with shrinkage constant `reg` but weighted by raw
    /// similarity. A zero or undefined weight sum returns the baseline.
    pub fn predict(&self, user: &str, item: &str, k: usize, reg: f64) -> MeepleResult<Prediction> {
        let baseline = self.baseline(user, item)?;
        let profile = self.profile(user)?;
        let neighbors = self.neighbors_among_rated(user, item, k, reg)?;

        let mut weight_sum = 0.0;
        let mut weighted_residuals = 0.0;
        for neighbor in &neighbors {
            let Some(rating) = profile.rating_of(&neighbor.item) else {
                continue;
            };
            let weight = self.get_similarity(item, &neighbor.item)?.similarity;
            let residual = rating - self.baseline(user, &neighbor.item)?;
            weight_sum += weight;
            weighted_residuals += weight * residual;
        }

        let mut prediction = Prediction {
            user: user.to_string(),
            item: item.to_string(),
            value: baseline,
            baseline,
            neighbors_used: neighbors.len(),
            fallback: None,
        };

        if weight_sum == 0.0 || !weight_sum.is_finite() {
            debug!(
                user,
                item,
                neighbors = neighbors.len(),
                "No confident neighbors, using baseline"
            );
            metrics::counter!("predict.fallback_baseline").increment(1);
            prediction.fallback = Some(PredictionFallback::NoConfidentNeighbors);
            return Ok(prediction);
        }

        prediction.value = baseline + weighted_residuals / weight_sum;
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::example_context;
    use crate::context::RecommenderContext;
    use meeple_core::config::SimilarityConfig;
    use meeple_core::ratings::normalize;
    use meeple_core::types::Rating;
    use meeple_similarity::SimilarityEngine;
    use std::sync::Arc;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_baseline_is_double_centered() {
        let ctx = example_context();
        let g = 26.0 / 7.0;
        // U1 mean 4.5, C mean 4.5
        assert!(close(ctx.baseline("U1", "C").unwrap(), 4.5 + 4.5 - g));
    }

    #[test]
    fn test_predict_adds_weighted_residual() {
        let ctx = example_context();
        // U1 rated B, which correlates +1 with C. A,C has one common rater
        // and contributes zero weight.
        let p = ctx.predict("U1", "C", 5, 0.0).unwrap();
        let residual_b = 4.0 - ctx.baseline("U1", "B").unwrap();
        assert!(close(p.value, p.baseline + residual_b));
        assert_eq!(p.neighbors_used, 2);
        assert_eq!(p.fallback, None);
    }

    #[test]
    fn test_predict_without_neighbors_is_baseline() {
        // lone rates only "solo", which shares no raters with anything.
        let ratings = normalize(&[
            Rating::new("a", "x", 4.0),
            Rating::new("a", "y", 2.0),
            Rating::new("b", "x", 3.0),
            Rating::new("b", "y", 5.0),
            Rating::new("lone", "solo", 1.0),
        ]);
        let store = SimilarityEngine::new(&SimilarityConfig::default())
            .build_direct(&ratings)
            .unwrap();
        let ctx = RecommenderContext::new(ratings, Arc::new(store)).unwrap();

        let p = ctx.predict("lone", "x", 7, 200.0).unwrap();
        assert_eq!(p.value, p.baseline);
        assert_eq!(p.neighbors_used, 1);
        assert_eq!(p.fallback, Some(PredictionFallback::NoConfidentNeighbors));

        // Predicting an item against only itself also has nothing to weigh.
        let own = ctx.predict("lone", "solo", 7, 200.0).unwrap();
        assert_eq!(own.neighbors_used, 0);
        assert_eq!(own.value, own.baseline);
    }

    #[test]
    fn test_zero_weight_neighbors_do_not_move_the_value() {
        let ctx = example_context();
        // U3 rated B (+1 with A) and C (zero with A).
        let both = ctx.predict("U3", "A", 2, 0.0).unwrap();
        let only_b = ctx.predict("U3", "A", 1, 0.0).unwrap();
        assert_eq!(both.neighbors_used, 2);
        assert_eq!(only_b.neighbors_used, 1);
        assert!(close(both.value, only_b.value));
        assert!(close(both.value, both.baseline + 2.0 - ctx.baseline("U3", "B").unwrap()));
    }

    #[test]
    fn test_predict_unknown_entities() {
        let ctx = example_context();
        assert!(ctx.predict("nobody", "A", 3, 0.0).unwrap_err().is_not_found());
        assert!(ctx.predict("U1", "Z", 3, 0.0).unwrap_err().is_not_found());
    }
}
