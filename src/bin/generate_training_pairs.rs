// src/bin/generate_training_pairs.rs

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

use matcher_lib::matching::normalize::try_load_nickname_map;
use matcher_lib::training::pair_generator::{
    fetch_population, negative_pairs, positive_variants, write_pairs_csv,
};
use matcher_lib::utils::db_connect;
use matcher_lib::utils::env::load_env;

/// Synthesizes labeled training pairs from the reference population
/// and writes them to a flat file.
#[derive(Parser, Debug)]
#[command(name = "generate_training_pairs", version, about)]
struct Args {
    /// Output pair file
    #[arg(long, default_value = "training_pairs.csv")]
    out: PathBuf,

    /// Seed for reproducible synthesis
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    env_logger::init();
    let args = Args::parse();

    let pool = db_connect::connect()
        .await
        .context("Failed to connect to Postgres")?;
    let population = fetch_population(&pool).await?;
    if population.is_empty() {
        anyhow::bail!("people_with_faces is empty; nothing to synthesize from");
    }
    let nicknames = try_load_nickname_map(&pool)
        .await
        .context("Failed to load nicknames table")?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let pb = ProgressBar::new(population.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut rows = Vec::new();
    for record in &population {
        rows.extend(positive_variants(record, &nicknames, &mut rng));
        pb.inc(1);
    }
    pb.finish_with_message("positives done");

    let negatives = negative_pairs(&population, &mut rng);
    info!(
        "Synthesized {} positive and {} negative pairs",
        rows.len(),
        negatives.len()
    );
    rows.extend(negatives);

    write_pairs_csv(&args.out, &rows)?;
    println!("Wrote {} labeled pairs to {}", rows.len(), args.out.display());
    Ok(())
}
