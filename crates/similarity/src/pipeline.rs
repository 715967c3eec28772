//! Map/reduce strategy for building the similarity store.
//!
//! Two stages, each a map step followed by a combine step:
//!
//! 1. every rating is keyed by its user, then each user's ratings are
//!    gathered into one list;
//! 2. each user's list is sorted by item and expanded into all unordered
//!    item pairs, then contributions are gathered per pair across users and
//!    scored.
//!
//! The stage functions are pure. [`PairPipeline`] wires them together with
//! bounded `mpsc` channels, hash-partitioning users and pairs over a fixed
//! number of reducer tasks. Output does not depend on partitioning: each
//! combine step orders its inputs before reducing them.

use crate::pair::{score_pair, OutcomeTally, PairKey, PairSimilarity};
use crate::statistic::{CoRating, SimilarityStatistic};
use crate::store::{SimilarityStore, SimilarityStoreBuilder};
use meeple_core::config::SimilarityConfig;
use meeple_core::error::{MeepleError, MeepleResult};
use meeple_core::ratings::NormalizedRatings;
use meeple_core::types::NormalizedRating;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Stage 1 value: one rating of the keyed user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Input row position, used to keep the first of duplicate ratings.
    pub seq: usize,
    pub item: String,
    pub rating: f64,
    pub item_avg: f64,
    pub user_avg: f64,
}

/// One side of a stage 2 contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatedSide {
    pub rating: f64,
    pub item_avg: f64,
    pub user_avg: f64,
}

/// Stage 2 value: one user's ratings of both items of the keyed pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairContribution {
    pub user: String,
    pub first: RatedSide,
    pub second: RatedSide,
}

/// Stage 1 map.
pub fn map_by_user(seq: usize, row: &NormalizedRating) -> (String, UserRecord) {
    (
        row.user.clone(),
        UserRecord {
            seq,
            item: row.item.clone(),
            rating: row.rating,
            item_avg: row.item_avg,
            user_avg: row.user_avg,
        },
    )
}

/// Stage 1 combine: one user's records in input order, keeping only the
/// first record for each item.
pub fn combine_by_user(mut records: Vec<UserRecord>) -> Vec<UserRecord> {
    records.sort_by_key(|r| r.seq);
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.item.clone()));
    records
}

/// Stage 2 map. The list is sorted by item before pairing so every pair is
/// emitted as `(smaller, larger)` regardless of the user's rating order.
pub fn map_by_pair(user: &str, mut records: Vec<UserRecord>) -> Vec<(PairKey, PairContribution)> {
    records.sort_by(|a, b| a.item.cmp(&b.item));

    let side = |r: &UserRecord| RatedSide {
        rating: r.rating,
        item_avg: r.item_avg,
        user_avg: r.user_avg,
    };

    let mut emitted = Vec::with_capacity(records.len() * records.len().saturating_sub(1) / 2);
    for (i, first) in records.iter().enumerate() {
        for second in &records[i + 1..] {
            emitted.push((
                PairKey::new(&first.item, &second.item),
                PairContribution {
                    user: user.to_string(),
                    first: side(first),
                    second: side(second),
                },
            ));
        }
    }
    emitted
}

/// Stage 2 combine: score a pair from every user's contribution. Support is
/// the number of contributions.
pub fn combine_by_pair(
    mut contributions: Vec<PairContribution>,
    statistic: &dyn SimilarityStatistic,
    min_support: usize,
) -> PairSimilarity {
    contributions.sort_by(|a, b| a.user.cmp(&b.user));
    let co_ratings: Vec<CoRating> = contributions
        .iter()
        .map(|c| CoRating {
            first: c.first.rating,
            second: c.second.rating,
            user_avg: c.first.user_avg,
        })
        .collect();
    score_pair(&co_ratings, statistic, min_support)
}

fn partition_of<K: Hash + ?Sized>(key: &K, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

async fn join<T>(handle: JoinHandle<MeepleResult<T>>, stage: &str) -> MeepleResult<T> {
    handle
        .await
        .map_err(|e| MeepleError::Pipeline(format!("{stage} task failed: {e}")))?
}

/// Channel-connected runner for the two stages.
pub struct PairPipeline {
    statistic: Arc<dyn SimilarityStatistic>,
    min_support: usize,
    partitions: usize,
    channel_capacity: usize,
}

impl PairPipeline {
    pub fn new(statistic: Arc<dyn SimilarityStatistic>, config: &SimilarityConfig) -> Self {
        Self {
            statistic,
            min_support: config.min_support,
            partitions: config.partitions.max(1),
            channel_capacity: config.channel_capacity.max(1),
        }
    }

    pub async fn run(&self, ratings: &NormalizedRatings) -> MeepleResult<SimilarityStore> {
        let start = Instant::now();
        let rows: Arc<Vec<NormalizedRating>> = Arc::new(ratings.rows().to_vec());

        // Stage 2 reducers.
        let mut pair_senders = Vec::with_capacity(self.partitions);
        let mut pair_reducers = Vec::with_capacity(self.partitions);
        for _ in 0..self.partitions {
            let (tx, rx) = mpsc::channel(self.channel_capacity);
            pair_senders.push(tx);
            pair_reducers.push(tokio::spawn(reduce_pairs(
                rx,
                self.statistic.clone(),
                self.min_support,
            )));
        }

        // Stage 1 reducers feed stage 2 once their input is exhausted.
        let mut user_senders = Vec::with_capacity(self.partitions);
        let mut user_reducers = Vec::with_capacity(self.partitions);
        for _ in 0..self.partitions {
            let (tx, rx) = mpsc::channel(self.channel_capacity);
            user_senders.push(tx);
            user_reducers.push(tokio::spawn(reduce_users(rx, pair_senders.clone())));
        }
        drop(pair_senders);

        // Stage 1 mappers over contiguous slices of the input.
        let chunk = rows.len().div_ceil(self.partitions).max(1);
        let mut mappers = Vec::with_capacity(self.partitions);
        for offset in (0..rows.len()).step_by(chunk) {
            let end = (offset + chunk).min(rows.len());
            let rows = rows.clone();
            let senders = user_senders.clone();
            mappers.push(tokio::spawn(async move {
                for seq in offset..end {
                    let (user, record) = map_by_user(seq, &rows[seq]);
                    let partition = partition_of(user.as_str(), senders.len());
                    senders[partition]
                        .send((user, record))
                        .await
                        .map_err(|_| MeepleError::Pipeline("user stage closed early".into()))?;
                }
                Ok::<usize, MeepleError>(end - offset)
            }));
        }
        drop(user_senders);

        for mapper in mappers {
            join(mapper, "map").await?;
        }
        let mut users = 0;
        for reducer in user_reducers {
            users += join(reducer, "user combine").await?;
        }

        let mut builder = SimilarityStoreBuilder::from_ratings(self.statistic.name(), ratings);
        let mut tally = OutcomeTally::default();
        for reducer in pair_reducers {
            for (key, scored) in join(reducer, "pair combine").await? {
                tally.record(scored.outcome);
                builder.insert(key, scored.entry)?;
            }
        }

        tally.publish();
        debug!(?tally, "Pipeline pair outcomes");
        info!(
            rows = rows.len(),
            users,
            pairs = tally.total(),
            degenerate = tally.degenerate,
            partitions = self.partitions,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline similarity build complete"
        );

        Ok(builder.freeze())
    }
}

async fn reduce_users(
    mut receiver: mpsc::Receiver<(String, UserRecord)>,
    pair_senders: Vec<mpsc::Sender<(PairKey, PairContribution)>>,
) -> MeepleResult<usize> {
    let mut groups: HashMap<String, Vec<UserRecord>> = HashMap::new();
    while let Some((user, record)) = receiver.recv().await {
        groups.entry(user).or_default().push(record);
    }

    let users = groups.len();
    for (user, records) in groups {
        for (key, contribution) in map_by_pair(&user, combine_by_user(records)) {
            let partition = partition_of(&key, pair_senders.len());
            pair_senders[partition]
                .send((key, contribution))
                .await
                .map_err(|_| MeepleError::Pipeline("pair stage closed early".into()))?;
        }
    }
    Ok(users)
}

async fn reduce_pairs(
    mut receiver: mpsc::Receiver<(PairKey, PairContribution)>,
    statistic: Arc<dyn SimilarityStatistic>,
    min_support: usize,
) -> MeepleResult<Vec<(PairKey, PairSimilarity)>> {
    let mut groups: HashMap<PairKey, Vec<PairContribution>> = HashMap::new();
    while let Some((key, contribution)) = receiver.recv().await {
        groups.entry(key).or_default().push(contribution);
    }

    Ok(groups
        .into_iter()
        .map(|(key, contributions)| {
            let scored = combine_by_pair(contributions, statistic.as_ref(), min_support);
            (key, scored)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::build_direct;
    use crate::statistic::Pearson;
    use crate::store::compare_stores;
    use meeple_core::ratings::normalize;
    use meeple_core::types::{Rating, SimilarityEntry};

    fn record(seq: usize, item: &str, rating: f64) -> UserRecord {
        UserRecord {
            seq,
            item: item.to_string(),
            rating,
            item_avg: 0.0,
            user_avg: 3.0,
        }
    }

    fn three_items() -> NormalizedRatings {
        normalize(&[
            Rating::new("U1", "A", 5.0),
            Rating::new("U1", "B", 4.0),
            Rating::new("U2", "A", 3.0),
            Rating::new("U2", "B", 3.0),
            Rating::new("U2", "C", 5.0),
            Rating::new("U3", "B", 2.0),
            Rating::new("U3", "C", 4.0),
        ])
    }

    fn config(partitions: usize) -> SimilarityConfig {
        SimilarityConfig {
            partitions,
            channel_capacity: 2,
            ..SimilarityConfig::default()
        }
    }

    #[test]
    fn test_map_by_user_keys_on_user() {
        let ratings = three_items();
        let (user, rec) = map_by_user(4, &ratings.rows()[4]);
        assert_eq!(user, "U2");
        assert_eq!(rec.seq, 4);
        assert_eq!(rec.item, "C");
        assert_eq!(rec.rating, 5.0);
        assert_eq!(rec.item_avg, 4.5);
    }

    #[test]
    fn test_combine_by_user_keeps_first_duplicate() {
        let combined = combine_by_user(vec![
            record(7, "x", 1.0),
            record(2, "y", 4.0),
            record(3, "x", 5.0),
        ]);
        assert_eq!(combined, vec![record(2, "y", 4.0), record(3, "x", 5.0)]);
    }

    #[test]
    fn test_map_by_pair_independent_of_rating_order() {
        let forward = map_by_pair(
            "u",
            vec![record(0, "a", 1.0), record(1, "b", 2.0), record(2, "c", 3.0)],
        );
        let reversed = map_by_pair(
            "u",
            vec![record(0, "c", 3.0), record(1, "b", 2.0), record(2, "a", 1.0)],
        );
        assert_eq!(forward, reversed);

        let keys: Vec<(&str, &str)> = forward.iter().map(|(k, _)| (k.first(), k.second())).collect();
        assert_eq!(keys, vec![("a", "b"), ("a", "c"), ("b", "c")]);
        // The first side always belongs to the smaller item.
        assert_eq!(forward[2].1.first.rating, 2.0);
        assert_eq!(forward[2].1.second.rating, 3.0);
    }

    #[test]
    fn test_map_by_pair_single_rating_emits_nothing() {
        assert!(map_by_pair("u", vec![record(0, "a", 1.0)]).is_empty());
    }

    #[test]
    fn test_combine_by_pair_support_counts_contributions() {
        let side = |rating| RatedSide {
            rating,
            item_avg: 0.0,
            user_avg: 3.0,
        };
        let contributions = vec![
            PairContribution {
                user: "u2".into(),
                first: side(1.0),
                second: side(2.0),
            },
            PairContribution {
                user: "u1".into(),
                first: side(5.0),
                second: side(4.0),
            },
        ];
        let scored = combine_by_pair(contributions, &Pearson, 2);
        assert_eq!(scored.entry.common_support, 2);
        assert!((scored.entry.similarity - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_pipeline_matches_direct_on_example() {
        let ratings = three_items();
        let direct = build_direct(&ratings, &Pearson, 2).unwrap();
        let piped = PairPipeline::new(Arc::new(Pearson), &config(3))
            .run(&ratings)
            .await
            .unwrap();

        assert!(compare_stores(&direct, &piped).agrees_within(1e-9));
        assert_eq!(piped.get("A", "C").unwrap().common_support, 1);
        assert_eq!(piped.get("A", "C").unwrap().similarity, 0.0);
        assert_eq!(piped.get("B", "B").unwrap(), SimilarityEntry::identity(3));
    }

    #[tokio::test]
    async fn test_pipeline_output_independent_of_partitions() {
        let ratings = three_items();
        let one = PairPipeline::new(Arc::new(Pearson), &config(1))
            .run(&ratings)
            .await
            .unwrap();
        let many = PairPipeline::new(Arc::new(Pearson), &config(8))
            .run(&ratings)
            .await
            .unwrap();
        assert!(compare_stores(&one, &many).agrees_within(0.0));
    }

    #[tokio::test]
    async fn test_pipeline_empty_input() {
        let store = PairPipeline::new(Arc::new(Pearson), &config(4))
            .run(&NormalizedRatings::default())
            .await
            .unwrap();
        assert_eq!(store.item_count(), 0);
        assert_eq!(store.pair_count(), 0);
    }
}
