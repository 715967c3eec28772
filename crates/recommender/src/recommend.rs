use crate::context::{RatedItem, RecommenderContext};
use meeple_core::error::MeepleResult;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub item: String,
    /// The item's average rating across all users.
    pub score: f64,
}

impl RecommenderContext {
    /// The user's `n` highest-rated items, ties in input order.
    pub fn top_choices(&self, user: &str, n: usize) -> MeepleResult<Vec<RatedItem>> {
        let mut rated = self.rated_items(user)?.to_vec();
        rated.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal));
        rated.truncate(n);
        Ok(rated)
    }

    /// Unrated neighbors of the user's top `n` items, ranked by item average.
    pub fn recommend(&self, user: &str, n: usize, k: usize, reg: f64) -> MeepleResult<Vec<Recommendation>> {
        metrics::counter!("recommend.requests").increment(1);
        let profile = self.profile(user)?;
        let choices = self.top_choices(user, n)?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for choice in &choices {
            for neighbor in self.neighbors_in_catalog(&choice.item, k, reg)? {
                if profile.has_rated(&neighbor.item) || !seen.insert(neighbor.item.clone()) {
                    continue;
                }
                candidates.push(neighbor.item);
            }
        }

        let mut ranked = candidates
            .into_iter()
            .map(|item| {
                let score = self.item_stats(&item)?.avg;
                Ok(Recommendation { item, score })
            })
            .collect::<MeepleResult<Vec<_>>>()?;
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        debug!(
            user,
            choices = choices.len(),
            recommendations = ranked.len(),
            "Recommendations ranked"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::example_context;
    use meeple_core::config::SimilarityConfig;
    use meeple_core::ratings::normalize;
    use meeple_core::types::Rating;
    use meeple_similarity::SimilarityEngine;
    use std::sync::Arc;

    fn context(rows: &[Rating]) -> RecommenderContext {
        let ratings = normalize(rows);
        let config = SimilarityConfig {
            min_support: 1,
            ..SimilarityConfig::default()
        };
        let store = SimilarityEngine::new(&config).build_direct(&ratings).unwrap();
        RecommenderContext::new(ratings, Arc::new(store)).unwrap()
    }

    #[test]
    fn test_top_choices_stable() {
        let ctx = context(&[
            Rating::new("u", "a", 3.0),
            Rating::new("u", "b", 5.0),
            Rating::new("u", "c", 3.0),
            Rating::new("u", "d", 5.0),
        ]);
        let top: Vec<String> = ctx.top_choices("u", 3).unwrap().into_iter().map(|r| r.item).collect();
        assert_eq!(top, vec!["b", "d", "a"]);
        assert_eq!(ctx.top_choices("u", 10).unwrap().len(), 4);
    }

    #[test]
    fn test_two_item_catalog() {
        let ctx = context(&[
            Rating::new("u", "a", 4.0),
            Rating::new("v", "a", 2.0),
            Rating::new("v", "b", 3.0),
        ]);
        let recs = ctx.recommend("u", 1, 1, 0.0).unwrap();
        assert!(recs.len() <= 1);
        assert!(recs.iter().all(|r| r.item != "a"));
        assert_eq!(recs[0].item, "b");
        assert_eq!(recs[0].score, 3.0);
    }

    #[test]
    fn test_ranked_by_item_average() {
        let ctx = example_context();
        // U1 rated A and B; C is the only unrated item.
        let recs = ctx.recommend("U1", 2, 2, 0.0).unwrap();
        assert_eq!(recs, vec![Recommendation { item: "C".into(), score: 4.5 }]);

        // U3's top choice is C. A neighbor of C is A, which U3 has not rated.
        let recs = ctx.recommend("U3", 1, 2, 0.0).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item, "A");
    }

    #[test]
    fn test_unions_without_duplicates() {
        let ctx = context(&[
            Rating::new("u", "a", 5.0),
            Rating::new("u", "b", 4.0),
            Rating::new("v", "a", 1.0),
            Rating::new("v", "b", 2.0),
            Rating::new("v", "c", 5.0),
            Rating::new("v", "d", 2.0),
        ]);
        let recs = ctx.recommend("u", 2, 3, 0.0).unwrap();
        let items: Vec<&str> = recs.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["c", "d"]);
    }

    #[test]
    fn test_unknown_user() {
        let ctx = example_context();
        assert!(ctx.recommend("nobody", 3, 3, 0.0).unwrap_err().is_not_found());
    }
}
