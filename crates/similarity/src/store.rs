//! Frozen similarity store.
//!
//! A store is assembled once through [`SimilarityStoreBuilder`] and is
//! read-only afterwards. Only pairs with at least one common rater are held;
//! any other pair of known items reads back as `(0, 0)`. Self entries are
//! derived from each item's rating count and are never stored as pairs.

use crate::pair::PairKey;
use chrono::{DateTime, Utc};
use meeple_core::error::{MeepleError, MeepleResult};
use meeple_core::ratings::NormalizedRatings;
use meeple_core::types::SimilarityEntry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

pub struct SimilarityStoreBuilder {
    statistic: String,
    items: Vec<String>,
    rating_counts: HashMap<String, usize>,
    pairs: HashMap<PairKey, SimilarityEntry>,
}

impl SimilarityStoreBuilder {
    pub fn new(statistic: impl Into<String>) -> Self {
        Self {
            statistic: statistic.into(),
            items: Vec::new(),
            rating_counts: HashMap::new(),
            pairs: HashMap::new(),
        }
    }

    /// Start a builder with every item of the rating set registered.
    pub fn from_ratings(statistic: impl Into<String>, ratings: &NormalizedRatings) -> Self {
        let mut builder = Self::new(statistic);
        for row in ratings {
            if !builder.rating_counts.contains_key(&row.item) {
                builder.add_item(row.item.clone(), row.item_review_count);
            }
        }
        builder
    }

    /// Register an item. Re-registering keeps the first position and updates
    /// the count.
    pub fn add_item(&mut self, item: String, rating_count: usize) {
        if self.rating_counts.insert(item.clone(), rating_count).is_none() {
            self.items.push(item);
        }
    }

    /// Record a computed pair. Entries without support are skipped since
    /// absent pairs already read back as zero.
    pub fn insert(&mut self, key: PairKey, entry: SimilarityEntry) -> MeepleResult<()> {
        if key.is_self() {
            return Err(MeepleError::InvalidStore(format!(
                "self pair '{}' cannot be inserted",
                key.first()
            )));
        }
        for item in [key.first(), key.second()] {
            if !self.rating_counts.contains_key(item) {
                return Err(MeepleError::UnknownItem(item.to_string()));
            }
        }
        if entry.common_support == 0 {
            return Ok(());
        }
        self.pairs.insert(key, entry);
        Ok(())
    }

    pub fn freeze(self) -> SimilarityStore {
        let index = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.clone(), i))
            .collect();
        SimilarityStore {
            batch_id: Uuid::new_v4(),
            built_at: Utc::now(),
            statistic: self.statistic,
            items: self.items,
            index,
            rating_counts: self.rating_counts,
            pairs: self.pairs,
        }
    }
}

/// Read-only mapping from unordered item pairs to similarity and support.
#[derive(Debug, Clone)]
pub struct SimilarityStore {
    batch_id: Uuid,
    built_at: DateTime<Utc>,
    statistic: String,
    items: Vec<String>,
    index: HashMap<String, usize>,
    rating_counts: HashMap<String, usize>,
    pairs: HashMap<PairKey, SimilarityEntry>,
}

impl SimilarityStore {
    /// Look up the entry for `{a, b}`. Fails only when either item is unknown.
    pub fn get(&self, a: &str, b: &str) -> MeepleResult<SimilarityEntry> {
        let count_a = self.rating_count(a)?;
        self.rating_count(b)?;

        if a == b {
            return Ok(SimilarityEntry::identity(count_a));
        }
        Ok(self
            .pairs
            .get(&PairKey::new(a, b))
            .copied()
            .unwrap_or(SimilarityEntry::ZERO))
    }

    pub fn rating_count(&self, item: &str) -> MeepleResult<usize> {
        self.rating_counts
            .get(item)
            .copied()
            .ok_or_else(|| MeepleError::UnknownItem(item.to_string()))
    }

    pub fn contains_item(&self, item: &str) -> bool {
        self.index.contains_key(item)
    }

    /// Items in registration order.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Number of stored pairs with non-zero support.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn statistic(&self) -> &str {
        &self.statistic
    }

    pub fn to_persisted(&self) -> PersistedStore {
        let mut pairs: Vec<PersistedPair> = self
            .pairs
            .iter()
            .map(|(key, entry)| PersistedPair {
                first: key.first().to_string(),
                second: key.second().to_string(),
                similarity: entry.similarity,
                support: entry.common_support,
            })
            .collect();
        pairs.sort_by(|a, b| (&a.first, &a.second).cmp(&(&b.first, &b.second)));

        PersistedStore {
            batch_id: self.batch_id,
            built_at: self.built_at,
            statistic: self.statistic.clone(),
            items: self
                .items
                .iter()
                .map(|item| PersistedItem {
                    item: item.clone(),
                    rating_count: self.rating_counts[item],
                })
                .collect(),
            pairs,
        }
    }

    /// Rebuild a store from its persisted form, checking that the pairs only
    /// reference listed items and that each unordered pair appears once.
    pub fn from_persisted(persisted: PersistedStore) -> MeepleResult<Self> {
        let mut builder = SimilarityStoreBuilder::new(persisted.statistic);
        for item in persisted.items {
            if builder.rating_counts.contains_key(&item.item) {
                return Err(MeepleError::InvalidStore(format!(
                    "item '{}' listed twice",
                    item.item
                )));
            }
            builder.add_item(item.item, item.rating_count);
        }

        let mut seen = HashSet::new();
        for pair in persisted.pairs {
            let key = PairKey::new(&pair.first, &pair.second);
            if !pair.similarity.is_finite() {
                return Err(MeepleError::InvalidStore(format!(
                    "non-finite similarity for ({}, {})",
                    key.first(),
                    key.second()
                )));
            }
            if pair.support == 0 && pair.similarity != 0.0 {
                return Err(MeepleError::InvalidStore(format!(
                    "non-zero similarity without support for ({}, {})",
                    key.first(),
                    key.second()
                )));
            }
            if !seen.insert(key.clone()) {
                return Err(MeepleError::InvalidStore(format!(
                    "pair ({}, {}) listed twice",
                    key.first(),
                    key.second()
                )));
            }
            builder.insert(
                key,
                SimilarityEntry {
                    similarity: pair.similarity,
                    common_support: pair.support,
                },
            )?;
        }

        let mut store = builder.freeze();
        store.batch_id = persisted.batch_id;
        store.built_at = persisted.built_at;
        Ok(store)
    }

    pub fn to_json(&self) -> MeepleResult<String> {
        Ok(serde_json::to_string(&self.to_persisted())?)
    }

    pub fn from_json(json: &str) -> MeepleResult<Self> {
        Self::from_persisted(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> MeepleResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!(
            path = %path.display(),
            batch_id = %self.batch_id,
            items = self.items.len(),
            pairs = self.pairs.len(),
            "Similarity store saved"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> MeepleResult<Self> {
        let path = path.as_ref();
        let store = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            batch_id = %store.batch_id,
            items = store.items.len(),
            pairs = store.pairs.len(),
            "Similarity store loaded"
        );
        Ok(store)
    }
}

/// Serialized form of a [`SimilarityStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStore {
    pub batch_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub statistic: String,
    pub items: Vec<PersistedItem>,
    pub pairs: Vec<PersistedPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedItem {
    pub item: String,
    pub rating_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPair {
    pub first: String,
    pub second: String,
    pub similarity: f64,
    pub support: usize,
}

/// Differences between two stores built over the same ratings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreComparison {
    pub items_compared: usize,
    pub pairs_compared: usize,
    pub max_similarity_delta: f64,
    /// Pairs whose support differs, as `(first, second, left, right)`.
    pub support_mismatches: Vec<(String, String, usize, usize)>,
    /// Items present in only one of the two stores.
    pub unmatched_items: Vec<String>,
}

impl StoreComparison {
    pub fn agrees_within(&self, tolerance: f64) -> bool {
        self.support_mismatches.is_empty()
            && self.unmatched_items.is_empty()
            && self.max_similarity_delta <= tolerance
    }
}

/// Compare every pair present in either store.
pub fn compare_stores(left: &SimilarityStore, right: &SimilarityStore) -> StoreComparison {
    let mut comparison = StoreComparison::default();

    for item in left.items() {
        if !right.contains_item(item) {
            comparison.unmatched_items.push(item.clone());
        }
    }
    for item in right.items() {
        if !left.contains_item(item) {
            comparison.unmatched_items.push(item.clone());
        }
    }
    comparison.items_compared = left.items().iter().filter(|i| right.contains_item(i)).count();

    let keys: HashSet<&PairKey> = left.pairs.keys().chain(right.pairs.keys()).collect();
    let mut keys: Vec<&PairKey> = keys.into_iter().collect();
    keys.sort();

    for key in keys {
        let (Ok(l), Ok(r)) = (
            left.get(key.first(), key.second()),
            right.get(key.first(), key.second()),
        ) else {
            continue;
        };
        comparison.pairs_compared += 1;
        let delta = (l.similarity - r.similarity).abs();
        if delta > comparison.max_similarity_delta {
            comparison.max_similarity_delta = delta;
        }
        if l.common_support != r.common_support {
            comparison.support_mismatches.push((
                key.first().to_string(),
                key.second().to_string(),
                l.common_support,
                r.common_support,
            ));
        }
    }

    for item in left.items().iter().filter(|i| right.contains_item(i)) {
        if left.rating_counts[item] != right.rating_counts[item] {
            comparison.support_mismatches.push((
                item.clone(),
                item.clone(),
                left.rating_counts[item],
                right.rating_counts[item],
            ));
        }
    }

    comparison
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> SimilarityStore {
        let mut builder = SimilarityStoreBuilder::new("pearson");
        builder.add_item("a".into(), 2);
        builder.add_item("b".into(), 3);
        builder.add_item("c".into(), 2);
        builder
            .insert(
                PairKey::new("b", "a"),
                SimilarityEntry {
                    similarity: 0.5,
                    common_support: 2,
                },
            )
            .unwrap();
        builder
            .insert(
                PairKey::new("a", "c"),
                SimilarityEntry {
                    similarity: 0.0,
                    common_support: 1,
                },
            )
            .unwrap();
        builder.freeze()
    }

    #[test]
    fn test_get_is_symmetric() {
        let store = sample_store();
        assert_eq!(store.get("a", "b").unwrap(), store.get("b", "a").unwrap());
        assert_eq!(store.get("a", "b").unwrap().similarity, 0.5);
    }

    #[test]
    fn test_self_entry_from_rating_count() {
        let store = sample_store();
        assert_eq!(store.get("b", "b").unwrap(), SimilarityEntry::identity(3));
    }

    #[test]
    fn test_absent_pair_reads_zero() {
        let store = sample_store();
        assert_eq!(store.get("b", "c").unwrap(), SimilarityEntry::ZERO);
    }

    #[test]
    fn test_unknown_item_is_not_found() {
        let store = sample_store();
        let err = store.get("a", "zzz").unwrap_err();
        assert!(matches!(err, MeepleError::UnknownItem(ref i) if i == "zzz"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_builder_rejects_unknown_and_self_pairs() {
        let mut builder = SimilarityStoreBuilder::new("pearson");
        builder.add_item("a".into(), 1);
        assert!(builder
            .insert(PairKey::new("a", "b"), SimilarityEntry::ZERO)
            .is_err());
        assert!(builder
            .insert(PairKey::new("a", "a"), SimilarityEntry::identity(1))
            .is_err());
    }

    #[test]
    fn test_zero_support_pairs_not_stored() {
        let mut builder = SimilarityStoreBuilder::new("pearson");
        builder.add_item("a".into(), 1);
        builder.add_item("b".into(), 1);
        builder
            .insert(PairKey::new("a", "b"), SimilarityEntry::ZERO)
            .unwrap();
        assert_eq!(builder.freeze().pair_count(), 0);
    }

    #[test]
    fn test_json_round_trip_keeps_invariants() {
        let store = sample_store();
        let restored = SimilarityStore::from_json(&store.to_json().unwrap()).unwrap();

        assert_eq!(restored.batch_id(), store.batch_id());
        assert_eq!(restored.statistic(), "pearson");
        assert_eq!(restored.items(), store.items());
        for a in store.items() {
            for b in store.items() {
                assert_eq!(restored.get(a, b).unwrap(), store.get(a, b).unwrap());
                assert_eq!(restored.get(a, b).unwrap(), restored.get(b, a).unwrap());
            }
        }
        assert!(compare_stores(&store, &restored).agrees_within(0.0));
    }

    #[test]
    fn test_from_persisted_rejects_duplicate_pair() {
        let mut persisted = sample_store().to_persisted();
        let mut flipped = persisted.pairs[0].clone();
        std::mem::swap(&mut flipped.first, &mut flipped.second);
        persisted.pairs.push(flipped);
        let err = SimilarityStore::from_persisted(persisted).unwrap_err();
        assert!(matches!(err, MeepleError::InvalidStore(_)));
    }

    #[test]
    fn test_from_persisted_rejects_unknown_item() {
        let mut persisted = sample_store().to_persisted();
        persisted.pairs.push(PersistedPair {
            first: "a".into(),
            second: "ghost".into(),
            similarity: 0.1,
            support: 3,
        });
        assert!(SimilarityStore::from_persisted(persisted).is_err());
    }

    #[test]
    fn test_from_persisted_rejects_non_finite() {
        let mut persisted = sample_store().to_persisted();
        persisted.pairs[0].similarity = f64::NAN;
        assert!(SimilarityStore::from_persisted(persisted).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let store = sample_store();
        let path = std::env::temp_dir().join(format!("meeple-store-{}.json", Uuid::new_v4()));
        store.save(&path).unwrap();
        let loaded = SimilarityStore::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.pair_count(), store.pair_count());
        assert_eq!(loaded.get("a", "b").unwrap().common_support, 2);
    }

    #[test]
    fn test_compare_reports_differences() {
        let left = sample_store();
        let mut builder = SimilarityStoreBuilder::new("pearson");
        builder.add_item("a".into(), 2);
        builder.add_item("b".into(), 3);
        builder
            .insert(
                PairKey::new("a", "b"),
                SimilarityEntry {
                    similarity: 0.25,
                    common_support: 1,
                },
            )
            .unwrap();
        let right = builder.freeze();

        let comparison = compare_stores(&left, &right);
        assert_eq!(comparison.unmatched_items, vec!["c".to_string()]);
        assert!((comparison.max_similarity_delta - 0.25).abs() < 1e-12);
        assert_eq!(
            comparison.support_mismatches,
            vec![("a".to_string(), "b".to_string(), 2, 1)]
        );
        assert!(!comparison.agrees_within(1.0));
    }
}
