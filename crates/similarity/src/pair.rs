use crate::statistic::{CoRating, SimilarityStatistic};
use meeple_core::types::{SimilarityEntry, SimilarityOutcome};

/// Unordered item pair, stored with the smaller identifier first so that
/// `{a, b}` and `{b, a}` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    pub fn is_self(&self) -> bool {
        self.first == self.second
    }
}

/// A scored pair together with how the score was reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSimilarity {
    pub entry: SimilarityEntry,
    pub outcome: SimilarityOutcome,
}

impl PairSimilarity {
    fn zero(common_support: usize, outcome: SimilarityOutcome) -> Self {
        Self {
            entry: SimilarityEntry {
                similarity: 0.0,
                common_support,
            },
            outcome,
        }
    }
}

/// Score a pair from its common raters. Both computation strategies go
/// through here, so the support threshold and the NaN policy are shared.
///
/// `min_support` below 1 is treated as 1.
pub fn score_pair(
    co_ratings: &[CoRating],
    statistic: &dyn SimilarityStatistic,
    min_support: usize,
) -> PairSimilarity {
    let support = co_ratings.len();
    if support == 0 {
        return PairSimilarity::zero(0, SimilarityOutcome::ZeroSupport);
    }
    if support < min_support.max(1) {
        return PairSimilarity::zero(support, SimilarityOutcome::InsufficientSupport);
    }

    let similarity = statistic.compute(co_ratings);
    if !similarity.is_finite() {
        return PairSimilarity::zero(support, SimilarityOutcome::Degenerate);
    }

    PairSimilarity {
        entry: SimilarityEntry {
            similarity,
            common_support: support,
        },
        outcome: SimilarityOutcome::Computed,
    }
}

/// Running count of pair outcomes for one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeTally {
    pub computed: usize,
    pub zero_support: usize,
    pub insufficient_support: usize,
    pub degenerate: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: SimilarityOutcome) {
        match outcome {
            SimilarityOutcome::Computed => self.computed += 1,
            SimilarityOutcome::ZeroSupport => self.zero_support += 1,
            SimilarityOutcome::InsufficientSupport => self.insufficient_support += 1,
            SimilarityOutcome::Degenerate => self.degenerate += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.computed + self.zero_support + self.insufficient_support + self.degenerate
    }

    pub fn publish(&self) {
        metrics::counter!("similarity.pairs_computed").increment(self.total() as u64);
        metrics::counter!("similarity.degenerate").increment(self.degenerate as u64);
        metrics::counter!("similarity.zero_support").increment(self.zero_support as u64);
        metrics::counter!("similarity.insufficient_support")
            .increment(self.insufficient_support as u64);
    }
}
