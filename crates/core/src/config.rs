use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `MEEPLE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ratings: RatingsConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub neighbors: NeighborsConfig,
    #[serde(default)]
    pub predict: PredictConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingsConfig {
    /// Users with fewer ratings are dropped before similarities are built.
    #[serde(default = "default_min_user_ratings")]
    pub min_user_ratings: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub statistic: StatisticKind,
    /// Common raters required before a pair's statistic is defined.
    #[serde(default = "default_min_support")]
    pub min_support: usize,
    /// Parallel workers per pipeline stage.
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Neighbor count and shrinkage constant for standalone neighbor queries.
#[derive(Debug, Clone, Deserialize)]
pub struct NeighborsConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_neighbor_reg")]
    pub reg: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_query_reg")]
    pub reg: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_query_reg")]
    pub reg: f64,
}

/// How the similarity store is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Pair by pair in one process.
    #[default]
    Direct,
    /// Map/reduce over user and pair partitions.
    Pipeline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticKind {
    /// Pearson correlation of user-mean-centered ratings.
    #[default]
    Pearson,
    /// Cosine similarity of raw ratings.
    Cosine,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Strategy::Direct),
            "pipeline" => Ok(Strategy::Pipeline),
            other => Err(format!("unknown strategy '{other}' (expected direct or pipeline)")),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Direct => write!(f, "direct"),
            Strategy::Pipeline => write!(f, "pipeline"),
        }
    }
}

impl FromStr for StatisticKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pearson" => Ok(StatisticKind::Pearson),
            "cosine" => Ok(StatisticKind::Cosine),
            other => Err(format!("unknown statistic '{other}' (expected pearson or cosine)")),
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatisticKind::Pearson => write!(f, "pearson"),
            StatisticKind::Cosine => write!(f, "cosine"),
        }
    }
}

// Default functions
fn default_min_user_ratings() -> usize {
    13
}
fn default_min_support() -> usize {
    2
}
fn default_partitions() -> usize {
    4
}
fn default_channel_capacity() -> usize {
    1024
}
fn default_k() -> usize {
    7
}
fn default_neighbor_reg() -> f64 {
    1000.0
}
fn default_query_reg() -> f64 {
    200.0
}
fn default_top_n() -> usize {
    5
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            min_user_ratings: default_min_user_ratings(),
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            statistic: StatisticKind::default(),
            min_support: default_min_support(),
            partitions: default_partitions(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for NeighborsConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            reg: default_neighbor_reg(),
        }
    }
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            reg: default_query_reg(),
        }
    }
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            k: default_k(),
            reg: default_query_reg(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ratings: RatingsConfig::default(),
            similarity: SimilarityConfig::default(),
            neighbors: NeighborsConfig::default(),
            predict: PredictConfig::default(),
            recommend: RecommendConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional config file.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("MEEPLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        config.try_deserialize()
    }
}
