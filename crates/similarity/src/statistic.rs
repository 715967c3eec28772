//! Pluggable similarity statistics.
//!
//! A statistic sees the ratings of every common rater of a pair and returns a
//! coefficient. It may return NaN when the coefficient is undefined; callers
//! normalize that through [`score_pair`](crate::pair::score_pair).

use meeple_core::config::StatisticKind;
use std::sync::Arc;

/// One common rater's ratings of both items of a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoRating {
    pub first: f64,
    pub second: f64,
    /// The rater's average over all of their ratings.
    pub user_avg: f64,
}

pub trait SimilarityStatistic: Send + Sync {
    /// Statistic name recorded in built stores.
    fn name(&self) -> &str;

    fn compute(&self, co_ratings: &[CoRating]) -> f64;
}

/// Pearson correlation between the two items' user-mean-centered ratings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pearson;

impl SimilarityStatistic for Pearson {
    fn name(&self) -> &str {
        "pearson"
    }

    fn compute(&self, co_ratings: &[CoRating]) -> f64 {
        let xs: Vec<f64> = co_ratings.iter().map(|c| c.first - c.user_avg).collect();
        let ys: Vec<f64> = co_ratings.iter().map(|c| c.second - c.user_avg).collect();
        if is_constant(&xs) || is_constant(&ys) {
            return f64::NAN;
        }
        correlation(&xs, &ys)
    }
}

/// Empty and single-value slices count as constant.
fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Cosine similarity between the two items' raw ratings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cosine;

impl SimilarityStatistic for Cosine {
    fn name(&self) -> &str {
        "cosine"
    }

    fn compute(&self, co_ratings: &[CoRating]) -> f64 {
        let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
        for c in co_ratings {
            sxy += c.first * c.second;
            sxx += c.first * c.first;
            syy += c.second * c.second;
        }
        if sxx == 0.0 || syy == 0.0 {
            return f64::NAN;
        }
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    }
}

pub fn statistic_for(kind: StatisticKind) -> Arc<dyn SimilarityStatistic> {
    match kind {
        StatisticKind::Pearson => Arc::new(Pearson),
        StatisticKind::Cosine => Arc::new(Cosine),
    }
}
