//! Item-to-item similarity: statistics over common raters, shrinkage, the
//! direct and map/reduce computation strategies, and the frozen store both
//! of them produce.

pub mod direct;
pub mod engine;
pub mod pair;
pub mod pipeline;
pub mod shrinkage;
pub mod statistic;
pub mod store;

pub use engine::SimilarityEngine;
pub use pair::{PairKey, PairSimilarity};
pub use shrinkage::shrink;
pub use statistic::{CoRating, Cosine, Pearson, SimilarityStatistic};
pub use store::{compare_stores, SimilarityStore, SimilarityStoreBuilder, StoreComparison};
