//! Rating store: groups raw ratings by user and by item and attaches the
//! mean and count of each group back onto every row.
//!
//! Aggregates are always recomputed from the full current rating set. Any
//! operation that changes which rows are present (such as dropping inactive
//! users) returns a freshly normalized set rather than patching the old one.

use crate::types::{NormalizedRating, Rating};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    sum: f64,
    count: usize,
}

impl Tally {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Normalize a rating table. Row order is preserved.
pub fn normalize(ratings: &[Rating]) -> NormalizedRatings {
    let mut by_user: HashMap<&str, Tally> = HashMap::new();
    let mut by_item: HashMap<&str, Tally> = HashMap::new();

    for r in ratings {
        by_user.entry(r.user.as_str()).or_default().add(r.rating);
        by_item.entry(r.item.as_str()).or_default().add(r.rating);
    }

    let rows = ratings
        .iter()
        .map(|r| {
            let user = by_user[r.user.as_str()];
            let item = by_item[r.item.as_str()];
            NormalizedRating {
                user: r.user.clone(),
                item: r.item.clone(),
                rating: r.rating,
                user_avg: user.mean(),
                user_review_count: user.count,
                item_avg: item.mean(),
                item_review_count: item.count,
            }
        })
        .collect();

    debug!(
        rows = ratings.len(),
        users = by_user.len(),
        items = by_item.len(),
        "Ratings normalized"
    );

    NormalizedRatings { rows }
}

/// A rating set with per-user and per-item aggregates attached to each row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRatings {
    rows: Vec<NormalizedRating>,
}

impl NormalizedRatings {
    /// Recompute every aggregate from the rows' raw ratings.
    pub fn renormalize(&self) -> Self {
        normalize(&self.to_ratings())
    }

    /// Keep only rows of users with at least `min_ratings` ratings, then
    /// recompute all aggregates against the reduced set.
    pub fn retain_active_users(&self, min_ratings: usize) -> Self {
        let kept: Vec<Rating> = self
            .rows
            .iter()
            .filter(|r| r.user_review_count >= min_ratings)
            .map(Rating::from)
            .collect();

        debug!(
            min_ratings,
            before = self.rows.len(),
            after = kept.len(),
            "Filtered ratings to active users"
        );

        normalize(&kept)
    }

    pub fn to_ratings(&self) -> Vec<Rating> {
        self.rows.iter().map(Rating::from).collect()
    }

    pub fn rows(&self) -> &[NormalizedRating] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedRating> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct items in first-seen order.
    pub fn items(&self) -> Vec<&str> {
        first_seen(self.rows.iter().map(|r| r.item.as_str()))
    }

    /// Distinct users in first-seen order.
    pub fn users(&self) -> Vec<&str> {
        first_seen(self.rows.iter().map(|r| r.user.as_str()))
    }

    /// Mean over every rating row, or `None` for an empty set.
    pub fn global_mean(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let sum: f64 = self.rows.iter().map(|r| r.rating).sum();
        Some(sum / self.rows.len() as f64)
    }
}

impl<'a> IntoIterator for &'a NormalizedRatings {
    type Item = &'a NormalizedRating;
    type IntoIter = std::slice::Iter<'a, NormalizedRating>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn first_seen<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(*v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Rating> {
        vec![
            Rating::new("u1", "a", 5.0),
            Rating::new("u1", "b", 4.0),
            Rating::new("u2", "a", 3.0),
            Rating::new("u2", "b", 3.0),
            Rating::new("u2", "c", 5.0),
            Rating::new("u3", "b", 2.0),
            Rating::new("u3", "c", 4.0),
        ]
    }

    #[test]
    fn test_normalize_attaches_aggregates() {
        let normalized = normalize(&sample());
        assert_eq!(normalized.len(), 7);

        let row = &normalized.rows()[0];
        assert_eq!(row.user, "u1");
        assert_eq!(row.user_avg, 4.5);
        assert_eq!(row.user_review_count, 2);
        assert_eq!(row.item_avg, 4.0);
        assert_eq!(row.item_review_count, 2);

        let c = normalized.iter().find(|r| r.item == "c").unwrap();
        assert_eq!(c.item_avg, 4.5);
        assert_eq!(c.item_review_count, 2);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(&sample());
        let twice = once.renormalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_retain_active_users_recomputes() {
        let normalized = normalize(&sample());
        let active = normalized.retain_active_users(3);

        // Only u2 has three ratings.
        assert_eq!(active.users(), vec!["u2"]);
        let b = active.iter().find(|r| r.item == "b").unwrap();
        assert_eq!(b.item_avg, 3.0);
        assert_eq!(b.item_review_count, 1);
        assert_eq!(b.user_review_count, 3);
    }

    #[test]
    fn test_items_and_users_first_seen_order() {
        let normalized = normalize(&sample());
        assert_eq!(normalized.items(), vec!["a", "b", "c"]);
        assert_eq!(normalized.users(), vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn test_global_mean() {
        let normalized = normalize(&sample());
        assert!((normalized.global_mean().unwrap() - 26.0 / 7.0).abs() < 1e-12);
        assert!(normalize(&[]).global_mean().is_none());
    }

    #[test]
    fn test_duplicate_rows_count_toward_aggregates() {
        let normalized = normalize(&[
            Rating::new("u1", "a", 4.0),
            Rating::new("u1", "a", 2.0),
        ]);
        let row = &normalized.rows()[1];
        assert_eq!(row.user_avg, 3.0);
        assert_eq!(row.item_review_count, 2);
    }
}
