//! Meeple: item-based collaborative filtering over board game ratings.
//!
//! Builds similarity stores in batch and answers similarity, neighbor,
//! prediction and recommendation queries. Results go to stdout as JSON,
//! logs go to stderr.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use meeple_core::config::{AppConfig, StatisticKind, Strategy};
use meeple_core::ratings::{normalize, NormalizedRatings};
use meeple_core::types::Rating;
use meeple_recommender::{neighbors, RecommenderContext};
use meeple_similarity::{compare_stores, SimilarityEngine, SimilarityStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "meeple")]
#[command(about = "Item-based collaborative filtering recommender")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, optional)
    #[arg(long, env = "MEEPLE_CONFIG")]
    config: Option<String>,

    /// Similarity strategy: direct or pipeline (overrides config)
    #[arg(long, env = "MEEPLE__SIMILARITY__STRATEGY")]
    strategy: Option<Strategy>,

    /// Similarity statistic: pearson or cosine (overrides config)
    #[arg(long, env = "MEEPLE__SIMILARITY__STATISTIC")]
    statistic: Option<StatisticKind>,

    /// Common raters required for a defined similarity (overrides config)
    #[arg(long, env = "MEEPLE__SIMILARITY__MIN_SUPPORT")]
    min_support: Option<usize>,

    /// Drop users with fewer ratings than this (overrides config)
    #[arg(long, env = "MEEPLE__RATINGS__MIN_USER_RATINGS")]
    min_user_ratings: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a similarity store from a ratings file
    Build {
        #[arg(long)]
        ratings: PathBuf,
        /// Write the store here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build with both strategies and report any disagreement
    Verify {
        #[arg(long)]
        ratings: PathBuf,
        #[arg(long, default_value_t = 1e-9)]
        tolerance: f64,
    },
    /// Similarity and support of one item pair
    Similarity {
        #[command(flatten)]
        source: Source,
        first: String,
        second: String,
    },
    /// Nearest neighbors of an item across the catalog
    Neighbors {
        #[command(flatten)]
        source: Source,
        item: String,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        reg: Option<f64>,
    },
    /// Predict a user's rating of an item
    Predict {
        #[command(flatten)]
        source: Source,
        user: String,
        item: String,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        reg: Option<f64>,
    },
    /// Recommend unrated items to a user
    Recommend {
        #[command(flatten)]
        source: Source,
        user: String,
        #[arg(long)]
        n: Option<usize>,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        reg: Option<f64>,
    },
}

/// Where a query context comes from.
#[derive(Args, Debug)]
struct Source {
    /// Ratings file: a JSON array of {user, item, rating}
    #[arg(long)]
    ratings: PathBuf,
    /// Previously built store; built from the ratings when absent
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Serialize)]
struct BuildSummary {
    batch_id: String,
    built_at: String,
    statistic: String,
    items: usize,
    pairs: usize,
    elapsed_ms: u128,
}

#[derive(Serialize)]
struct PredictionReport {
    #[serde(flatten)]
    prediction: meeple_recommender::Prediction,
    actual: Option<f64>,
    item_average: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeple=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(strategy) = cli.strategy {
        config.similarity.strategy = strategy;
    }
    if let Some(statistic) = cli.statistic {
        config.similarity.statistic = statistic;
    }
    if let Some(min_support) = cli.min_support {
        config.similarity.min_support = min_support;
    }
    if let Some(min_user_ratings) = cli.min_user_ratings {
        config.ratings.min_user_ratings = min_user_ratings;
    }

    info!(
        strategy = %config.similarity.strategy,
        statistic = %config.similarity.statistic,
        min_support = config.similarity.min_support,
        min_user_ratings = config.ratings.min_user_ratings,
        "Configuration loaded"
    );

    let engine = SimilarityEngine::new(&config.similarity);

    match cli.command {
        Command::Build { ratings, out } => {
            let ratings = load_ratings(&ratings, &config)?;
            let started = Instant::now();
            let store = engine.build(&ratings).await?;
            let summary = BuildSummary {
                batch_id: store.batch_id().to_string(),
                built_at: store.built_at().to_rfc3339(),
                statistic: store.statistic().to_string(),
                items: store.item_count(),
                pairs: store.pair_count(),
                elapsed_ms: started.elapsed().as_millis(),
            };
            match out {
                Some(path) => {
                    store.save(&path)?;
                    print_json(&summary)?;
                }
                None => println!("{}", store.to_json()?),
            }
        }
        Command::Verify { ratings, tolerance } => {
            let ratings = load_ratings(&ratings, &config)?;
            let direct = engine.build_with(Strategy::Direct, &ratings).await?;
            let piped = engine.build_with(Strategy::Pipeline, &ratings).await?;
            let report = compare_stores(&direct, &piped);
            let agrees = report.agrees_within(tolerance);
            if agrees {
                info!(pairs = report.pairs_compared, "Strategies agree");
            } else {
                warn!(
                    max_delta = report.max_similarity_delta,
                    support_mismatches = report.support_mismatches.len(),
                    "Strategies disagree"
                );
            }
            print_json(&report)?;
            if !agrees {
                anyhow::bail!("direct and pipeline stores differ beyond {tolerance}");
            }
        }
        Command::Similarity {
            source,
            first,
            second,
        } => {
            let ctx = load_context(&source, &config, &engine).await?;
            print_json(&ctx.get_similarity(&first, &second)?)?;
        }
        Command::Neighbors { source, item, k, reg } => {
            let ctx = load_context(&source, &config, &engine).await?;
            let k = k.unwrap_or(config.neighbors.k);
            let reg = reg.unwrap_or(config.neighbors.reg);
            print_json(&neighbors(&item, ctx.catalog(), ctx.store(), k, reg)?)?;
        }
        Command::Predict {
            source,
            user,
            item,
            k,
            reg,
        } => {
            let ctx = load_context(&source, &config, &engine).await?;
            let k = k.unwrap_or(config.predict.k);
            let reg = reg.unwrap_or(config.predict.reg);
            let prediction = ctx.predict(&user, &item, k, reg)?;
            let (actual, item_average) = ctx.rating_with_item_average(&user, &item)?;
            print_json(&PredictionReport {
                prediction,
                actual,
                item_average,
            })?;
        }
        Command::Recommend {
            source,
            user,
            n,
            k,
            reg,
        } => {
            let ctx = load_context(&source, &config, &engine).await?;
            let n = n.unwrap_or(config.recommend.top_n);
            let k = k.unwrap_or(config.recommend.k);
            let reg = reg.unwrap_or(config.recommend.reg);
            print_json(&ctx.recommend(&user, n, k, reg)?)?;
        }
    }

    Ok(())
}

fn load_ratings(path: &Path, config: &AppConfig) -> anyhow::Result<NormalizedRatings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading ratings from {}", path.display()))?;
    let rows: Vec<Rating> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing ratings in {}", path.display()))?;

    let ratings = normalize(&rows).retain_active_users(config.ratings.min_user_ratings);
    info!(
        path = %path.display(),
        rows = rows.len(),
        kept = ratings.len(),
        users = ratings.users().len(),
        items = ratings.items().len(),
        "Ratings loaded"
    );
    Ok(ratings)
}

async fn load_context(
    source: &Source,
    config: &AppConfig,
    engine: &SimilarityEngine,
) -> anyhow::Result<RecommenderContext> {
    let ratings = load_ratings(&source.ratings, config)?;
    let ctx = match &source.store {
        Some(path) => RecommenderContext::new(ratings, Arc::new(SimilarityStore::load(path)?))?,
        None => RecommenderContext::build(ratings, engine).await?,
    };
    Ok(ctx)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
