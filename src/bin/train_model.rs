// src/bin/train_model.rs

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use matcher_lib::embedding::{create_shared_embedding_cache, HttpEmbeddingClient};
use matcher_lib::matching::features::extract_pair_features;
use matcher_lib::training::pair_generator::read_pairs_csv;
use matcher_lib::training::trainer::train_and_evaluate;
use matcher_lib::utils::env::load_env;
use matcher_lib::MatchingConfig;

const FEATURE_EXTRACTION_CONCURRENCY: usize = 8;

/// Trains the match classifier from a labeled pair file and promotes
/// the artifact.
#[derive(Parser, Debug)]
#[command(name = "train_model", version, about)]
struct Args {
    /// Labeled pair file produced by generate_training_pairs
    #[arg(long, default_value = "training_pairs.csv")]
    pairs: PathBuf,

    /// Seed for a reproducible train/test split
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    env_logger::init();
    let args = Args::parse();
    let config = MatchingConfig::from_env();
    config.log_config();

    let rows = read_pairs_csv(&args.pairs)?;
    if rows.is_empty() {
        anyhow::bail!("{} holds no pairs", args.pairs.display());
    }

    let embedder = Arc::new(HttpEmbeddingClient::new(&config.embedding_endpoint));
    let cache = create_shared_embedding_cache(config.embedding_cache_size);

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pairs ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let samples: Vec<_> = stream::iter(rows)
        .map(|row| {
            let embedder = Arc::clone(&embedder);
            let cache = Arc::clone(&cache);
            let pb = pb.clone();
            async move {
                let pair = row.to_pair();
                let (features, _) =
                    extract_pair_features(&pair, None, None, embedder.as_ref(), &cache).await;
                pb.inc(1);
                (features, row.label as f64)
            }
        })
        .buffered(FEATURE_EXTRACTION_CONCURRENCY)
        .collect()
        .await;
    pb.finish_with_message("features extracted");

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let (model, report) = train_and_evaluate(samples, &mut rng)?;
    println!("{}", report);

    model
        .promote_to(Path::new(&config.model_path))
        .with_context(|| format!("Failed to write model artifact {}", config.model_path))?;
    println!("Model artifact written to {}", config.model_path);
    Ok(())
}
