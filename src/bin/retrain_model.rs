// src/bin/retrain_model.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use matcher_lib::embedding::{create_shared_embedding_cache, HttpEmbeddingClient};
use matcher_lib::training::feedback::{retrain_from_feedback, RetrainOutcome};
use matcher_lib::utils::db_connect;
use matcher_lib::utils::env::load_env;
use matcher_lib::{MatchingConfig, ModelHandle};

/// Retrains the match classifier from accumulated user feedback and
/// promotes it when it clears the quality gate.
#[derive(Parser, Debug)]
#[command(name = "retrain_model", version, about)]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    env_logger::init();
    let _args = Args::parse();
    let config = MatchingConfig::from_env();
    config.log_config();

    let pool = db_connect::connect()
        .await
        .context("Failed to connect to Postgres")?;
    let embedder = Arc::new(HttpEmbeddingClient::new(&config.embedding_endpoint));
    let cache = create_shared_embedding_cache(config.embedding_cache_size);
    let handle = ModelHandle::load(Path::new(&config.model_path)).with_context(|| {
        format!(
            "No usable model artifact at {}; run train_model first",
            config.model_path
        )
    })?;

    match retrain_from_feedback(&pool, embedder, &cache, &handle, &config).await? {
        RetrainOutcome::Skipped { found, required } => {
            println!(
                "Retrain skipped: {} feedback rows available, {} required.",
                found, required
            );
        }
        RetrainOutcome::RejectedQuality { report } => {
            println!("Candidate model rejected by the quality gate:\n{}", report);
        }
        RetrainOutcome::Promoted { report, version } => {
            println!("Promoted model v{}:\n{}", version, report);
        }
    }
    Ok(())
}
