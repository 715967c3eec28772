//! Direct strategy: every item pair is scored in one process from a per-item
//! index of raters.
//!
//! When a user rated the same item more than once, the first row in input
//! order is the one that counts for similarity. Later duplicates still count
//! toward the user's and the item's aggregates.

use crate::pair::{score_pair, OutcomeTally, PairKey, PairSimilarity};
use crate::statistic::{CoRating, SimilarityStatistic};
use crate::store::{SimilarityStore, SimilarityStoreBuilder};
use meeple_core::error::MeepleResult;
use meeple_core::ratings::NormalizedRatings;
use meeple_core::types::{SimilarityEntry, SimilarityOutcome};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
struct Rated {
    rating: f64,
    user_avg: f64,
}

/// Raters of each item, keyed by user in sorted order.
pub struct DirectIndex<'a> {
    items: Vec<&'a str>,
    raters: HashMap<&'a str, BTreeMap<&'a str, Rated>>,
    /// Total ratings per item, duplicates included.
    rating_counts: HashMap<&'a str, usize>,
}

impl<'a> DirectIndex<'a> {
    pub fn new(ratings: &'a NormalizedRatings) -> Self {
        let mut items = Vec::new();
        let mut raters: HashMap<&'a str, BTreeMap<&'a str, Rated>> = HashMap::new();
        let mut rating_counts = HashMap::new();

        for row in ratings {
            rating_counts.insert(row.item.as_str(), row.item_review_count);
            let by_user = raters.entry(row.item.as_str()).or_insert_with(|| {
                items.push(row.item.as_str());
                BTreeMap::new()
            });
            by_user.entry(row.user.as_str()).or_insert(Rated {
                rating: row.rating,
                user_avg: row.user_avg,
            });
        }

        Self {
            items,
            raters,
            rating_counts,
        }
    }

    pub fn items(&self) -> &[&'a str] {
        &self.items
    }

    /// Score `{a, b}` from the users who rated both, in user order. An item
    /// against itself is the identity entry over its total rating count.
    pub fn similarity(
        &self,
        a: &str,
        b: &str,
        statistic: &dyn SimilarityStatistic,
        min_support: usize,
    ) -> PairSimilarity {
        let key = PairKey::new(a, b);
        if key.is_self() {
            if let Some(&count) = self.rating_counts.get(key.first()) {
                return PairSimilarity {
                    entry: SimilarityEntry::identity(count),
                    outcome: SimilarityOutcome::Computed,
                };
            }
        }
        let (Some(first), Some(second)) = (
            self.raters.get(key.first()),
            self.raters.get(key.second()),
        ) else {
            return score_pair(&[], statistic, min_support);
        };

        let co_ratings: Vec<CoRating> = first
            .iter()
            .filter_map(|(user, f)| {
                second.get(user).map(|s| CoRating {
                    first: f.rating,
                    second: s.rating,
                    user_avg: f.user_avg,
                })
            })
            .collect();

        score_pair(&co_ratings, statistic, min_support)
    }
}

/// Similarity and common support of one pair, computed straight from the
/// rating set.
pub fn similarity(
    a: &str,
    b: &str,
    ratings: &NormalizedRatings,
    statistic: &dyn SimilarityStatistic,
    min_support: usize,
) -> PairSimilarity {
    DirectIndex::new(ratings).similarity(a, b, statistic, min_support)
}

/// Build a full store by scoring every unordered pair of items.
pub fn build_direct(
    ratings: &NormalizedRatings,
    statistic: &dyn SimilarityStatistic,
    min_support: usize,
) -> MeepleResult<SimilarityStore> {
    let start = Instant::now();
    let index = DirectIndex::new(ratings);
    let mut builder = SimilarityStoreBuilder::from_ratings(statistic.name(), ratings);
    let mut tally = OutcomeTally::default();

    let items = index.items();
    for (i, a) in items.iter().enumerate() {
        for b in &items[i + 1..] {
            let scored = index.similarity(a, b, statistic, min_support);
            tally.record(scored.outcome);
            builder.insert(PairKey::new(a, b), scored.entry)?;
        }
    }

    tally.publish();
    debug!(?tally, "Direct pair outcomes");
    info!(
        rows = ratings.len(),
        items = items.len(),
        pairs = tally.total(),
        degenerate = tally.degenerate,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Direct similarity build complete"
    );

    Ok(builder.freeze())
}
