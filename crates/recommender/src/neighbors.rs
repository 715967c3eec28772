use crate::context::RecommenderContext;
use meeple_core::error::MeepleResult;
use meeple_similarity::{shrink, SimilarityStore};
use serde::Serialize;
use std::cmp::Ordering;

/// A candidate ranked against a target item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub item: String,
    pub shrunk_similarity: f64,
    pub support: usize,
}

/// Top-`k` candidates most similar to `item` by shrunk similarity.
///
/// Ties keep the candidates' input order. `item` itself never appears; when it
/// is among the candidates the next-ranked candidate takes its slot, so the
/// result holds `min(k, candidates without item)` entries. Unknown items in
/// either position are a not-found error.
pub fn neighbors<S: AsRef<str>>(
    item: &str,
    candidates: &[S],
    store: &SimilarityStore,
    k: usize,
    reg: f64,
) -> MeepleResult<Vec<Neighbor>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let candidate = candidate.as_ref();
        let entry = store.get(item, candidate)?;
        scored.push(Neighbor {
            item: candidate.to_string(),
            shrunk_similarity: shrink(entry.similarity, entry.common_support, reg),
            support: entry.common_support,
        });
    }

    // sort_by is stable
    scored.sort_by(|a, b| {
        b.shrunk_similarity
            .partial_cmp(&a.shrunk_similarity)
            .unwrap_or(Ordering::Equal)
    });

    let k = k.min(scored.len());
    Ok(scored
        .into_iter()
        .filter(|n| n.item != item)
        .take(k)
        .collect())
}

impl RecommenderContext {
    /// Neighbors of `item` among the items `user` has rated.
    pub fn neighbors_among_rated(
        &self,
        user: &str,
        item: &str,
        k: usize,
        reg: f64,
    ) -> MeepleResult<Vec<Neighbor>> {
        let rated: Vec<&str> = self
            .rated_items(user)?
            .iter()
            .map(|r| r.item.as_str())
            .collect();
        // Validate the target even when the user has rated nothing else.
        self.item_stats(item)?;
        neighbors(item, &rated, self.store(), k, reg)
    }

    /// Neighbors of `item` across the whole catalog.
    pub fn neighbors_in_catalog(&self, item: &str, k: usize, reg: f64) -> MeepleResult<Vec<Neighbor>> {
        neighbors(item, self.catalog(), self.store(), k, reg)
    }
}
