use serde::{Deserialize, Serialize};

/// A single (user, item, rating) observation as produced by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user: String,
    pub item: String,
    pub rating: f64,
}

impl Rating {
    pub fn new(user: impl Into<String>, item: impl Into<String>, rating: f64) -> Self {
        Self {
            user: user.into(),
            item: item.into(),
            rating,
        }
    }
}

/// A rating row with the per-user and per-item aggregates of the rating set
/// it was normalized against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRating {
    pub user: String,
    pub item: String,
    pub rating: f64,
    pub user_avg: f64,
    pub user_review_count: usize,
    pub item_avg: f64,
    pub item_review_count: usize,
}

impl NormalizedRating {
    /// Drop the derived aggregates.
    pub fn to_rating(&self) -> Rating {
        Rating {
            user: self.user.clone(),
            item: self.item.clone(),
            rating: self.rating,
        }
    }
}

impl From<&NormalizedRating> for Rating {
    fn from(row: &NormalizedRating) -> Self {
        row.to_rating()
    }
}

/// Similarity between two items and the number of users who rated both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEntry {
    pub similarity: f64,
    pub common_support: usize,
}

impl SimilarityEntry {
    pub const ZERO: SimilarityEntry = SimilarityEntry {
        similarity: 0.0,
        common_support: 0,
    };

    /// Entry of an item against itself.
    pub fn identity(rating_count: usize) -> Self {
        Self {
            similarity: 1.0,
            common_support: rating_count,
        }
    }
}

/// How a pair's similarity was arrived at. Every variant other than
/// `Computed` is a recovered statistical edge case with similarity 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityOutcome {
    Computed,
    /// No user rated both items.
    ZeroSupport,
    /// Fewer common raters than the configured minimum for a defined statistic.
    InsufficientSupport,
    /// The statistic was undefined (zero variance on either side).
    Degenerate,
}
