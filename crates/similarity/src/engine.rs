//! Similarity engine: builds a frozen store from a normalized rating set
//! with the configured statistic and strategy.

use crate::direct::{self, build_direct};
use crate::pair::PairSimilarity;
use crate::pipeline::PairPipeline;
use crate::statistic::{statistic_for, SimilarityStatistic};
use crate::store::SimilarityStore;
use meeple_core::config::{SimilarityConfig, Strategy};
use meeple_core::error::MeepleResult;
use meeple_core::ratings::NormalizedRatings;
use std::sync::Arc;
use tracing::info;

pub struct SimilarityEngine {
    statistic: Arc<dyn SimilarityStatistic>,
    config: SimilarityConfig,
}

impl SimilarityEngine {
    pub fn new(config: &SimilarityConfig) -> Self {
        Self {
            statistic: statistic_for(config.statistic),
            config: config.clone(),
        }
    }

    /// Use a custom statistic in place of the configured one.
    pub fn with_statistic(config: &SimilarityConfig, statistic: Arc<dyn SimilarityStatistic>) -> Self {
        Self {
            statistic,
            config: config.clone(),
        }
    }

    pub fn statistic(&self) -> &dyn SimilarityStatistic {
        self.statistic.as_ref()
    }

    /// Score a single pair directly against the rating set.
    pub fn pair(&self, a: &str, b: &str, ratings: &NormalizedRatings) -> PairSimilarity {
        direct::similarity(a, b, ratings, self.statistic.as_ref(), self.config.min_support)
    }

    /// Build with the configured strategy.
    pub async fn build(&self, ratings: &NormalizedRatings) -> MeepleResult<SimilarityStore> {
        self.build_with(self.config.strategy, ratings).await
    }

    pub async fn build_with(
        &self,
        strategy: Strategy,
        ratings: &NormalizedRatings,
    ) -> MeepleResult<SimilarityStore> {
        info!(
            strategy = %strategy,
            statistic = self.statistic.name(),
            min_support = self.config.min_support,
            rows = ratings.len(),
            "Building similarity store"
        );
        match strategy {
            Strategy::Direct => self.build_direct(ratings),
            Strategy::Pipeline => self.build_pipeline(ratings).await,
        }
    }

    pub fn build_direct(&self, ratings: &NormalizedRatings) -> MeepleResult<SimilarityStore> {
        build_direct(ratings, self.statistic.as_ref(), self.config.min_support)
    }

    pub async fn build_pipeline(&self, ratings: &NormalizedRatings) -> MeepleResult<SimilarityStore> {
        PairPipeline::new(self.statistic.clone(), &self.config)
            .run(ratings)
            .await
    }
}
