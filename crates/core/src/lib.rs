//! Shared records, the rating store, errors, and configuration.

pub mod config;
pub mod error;
pub mod ratings;
pub mod types;

pub use config::AppConfig;
pub use error::{MeepleError, MeepleResult};
pub use ratings::{normalize, NormalizedRatings};
pub use types::{NormalizedRating, Rating, SimilarityEntry, SimilarityOutcome};
