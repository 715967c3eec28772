//! Query context: the rating set, its per-user and per-item statistics, and
//! the similarity store built from it. Every query runs against one context;
//! nothing is looked up from process-wide state.

use meeple_core::error::{MeepleError, MeepleResult};
use meeple_core::ratings::NormalizedRatings;
use meeple_core::types::SimilarityEntry;
use meeple_similarity::{SimilarityEngine, SimilarityStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// An item and the rating one user gave it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedItem {
    pub item: String,
    pub rating: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct UserProfile {
    pub avg: f64,
    /// First rating per item, in input order.
    pub rated: Vec<RatedItem>,
    by_item: HashMap<String, f64>,
}

impl UserProfile {
    pub fn rating_of(&self, item: &str) -> Option<f64> {
        self.by_item.get(item).copied()
    }

    pub fn has_rated(&self, item: &str) -> bool {
        self.by_item.contains_key(item)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ItemStats {
    pub avg: f64,
}

pub struct RecommenderContext {
    ratings: NormalizedRatings,
    store: Arc<SimilarityStore>,
    global_mean: f64,
    users: HashMap<String, UserProfile>,
    items: HashMap<String, ItemStats>,
    catalog: Vec<String>,
}

impl RecommenderContext {
    /// Pair a rating set with a store. Every rated item must be in the store.
    pub fn new(ratings: NormalizedRatings, store: Arc<SimilarityStore>) -> MeepleResult<Self> {
        let mut users: HashMap<String, UserProfile> = HashMap::new();
        let mut items: HashMap<String, ItemStats> = HashMap::new();
        let mut catalog = Vec::new();

        for row in &ratings {
            let profile = users.entry(row.user.clone()).or_insert_with(|| UserProfile {
                avg: row.user_avg,
                rated: Vec::new(),
                by_item: HashMap::new(),
            });
            if !profile.by_item.contains_key(&row.item) {
                profile.by_item.insert(row.item.clone(), row.rating);
                profile.rated.push(RatedItem {
                    item: row.item.clone(),
                    rating: row.rating,
                });
            }

            if !items.contains_key(&row.item) {
                if !store.contains_item(&row.item) {
                    return Err(MeepleError::InvalidStore(format!(
                        "rated item '{}' is missing from store {}",
                        row.item,
                        store.batch_id()
                    )));
                }
                items.insert(row.item.clone(), ItemStats { avg: row.item_avg });
                catalog.push(row.item.clone());
            }
        }

        let global_mean = ratings.global_mean().unwrap_or(0.0);

        info!(
            users = users.len(),
            items = catalog.len(),
            rows = ratings.len(),
            batch_id = %store.batch_id(),
            "Recommender context ready"
        );

        Ok(Self {
            ratings,
            store,
            global_mean,
            users,
            items,
            catalog,
        })
    }

    /// Build a store with `engine` and wrap both into a context.
    pub async fn build(ratings: NormalizedRatings, engine: &SimilarityEngine) -> MeepleResult<Self> {
        let store = engine.build(&ratings).await?;
        Self::new(ratings, Arc::new(store))
    }

    pub fn ratings(&self) -> &NormalizedRatings {
        &self.ratings
    }

    pub fn store(&self) -> &SimilarityStore {
        &self.store
    }

    /// Every rated item, in first-seen order.
    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn get_similarity(&self, a: &str, b: &str) -> MeepleResult<SimilarityEntry> {
        self.store.get(a, b)
    }

    pub fn item_average(&self, item: &str) -> MeepleResult<f64> {
        self.item_stats(item).map(|s| s.avg)
    }

    pub fn user_average(&self, user: &str) -> MeepleResult<f64> {
        self.profile(user).map(|p| p.avg)
    }

    /// Items the user rated, first rating per item, in input order.
    pub fn rated_items(&self, user: &str) -> MeepleResult<&[RatedItem]> {
        self.profile(user).map(|p| p.rated.as_slice())
    }

    /// The user's own rating of `item` (if any) and the item's average.
    pub fn rating_with_item_average(&self, user: &str, item: &str) -> MeepleResult<(Option<f64>, f64)> {
        let profile = self.profile(user)?;
        let avg = self.item_average(item)?;
        Ok((profile.rating_of(item), avg))
    }

    pub(crate) fn profile(&self, user: &str) -> MeepleResult<&UserProfile> {
        self.users
            .get(user)
            .ok_or_else(|| MeepleError::UnknownUser(user.to_string()))
    }

    pub(crate) fn item_stats(&self, item: &str) -> MeepleResult<ItemStats> {
        self.items
            .get(item)
            .copied()
            .ok_or_else(|| MeepleError::UnknownItem(item.to_string()))
    }
}
