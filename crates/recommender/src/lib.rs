//! Online queries over a frozen similarity store: neighbor retrieval,
//! rating prediction, and recommendation.

pub mod context;
pub mod handle;
pub mod neighbors;
pub mod predictor;
pub mod recommend;

pub use context::{RatedItem, RecommenderContext};
pub use handle::ContextHandle;
pub use neighbors::{neighbors, Neighbor};
pub use predictor::{Prediction, PredictionFallback};
pub use recommend::Recommendation;
