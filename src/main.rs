// src/main.rs

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::NaiveDate;
use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use matcher_lib::embedding::{create_shared_embedding_cache, HttpEmbeddingClient};
use matcher_lib::models::{FeedbackRecord, QueryRecord, ScoredMatch};
use matcher_lib::training::feedback::log_user_feedback;
use matcher_lib::utils::db_connect;
use matcher_lib::utils::env::load_env;
use matcher_lib::{run_search, MatchingConfig, ModelHandle, PipelineDeps};

/// Searches the reference population for likely duplicates of one
/// person, and optionally records a confirm/reject decision on a
/// returned match.
#[derive(Parser, Debug)]
#[command(name = "dedupe_search", version, about)]
struct Args {
    /// Given name of the person to search for
    #[arg(long)]
    first: String,

    /// Family name of the person to search for
    #[arg(long)]
    last: String,

    /// Birth date, YYYY-MM-DD
    #[arg(long)]
    dob: Option<NaiveDate>,

    /// Email address
    #[arg(long)]
    email: Option<String>,

    /// Master data management identifier
    #[arg(long)]
    mdm: Option<String>,

    /// Path to a headshot image file
    #[arg(long)]
    headshot: Option<PathBuf>,

    /// Show at most this many results
    #[arg(long, default_value_t = 10)]
    limit: usize,

    /// Record the match with this person_id as confirmed correct
    #[arg(long, conflicts_with = "reject")]
    confirm: Option<i64>,

    /// Record the match with this person_id as rejected
    #[arg(long)]
    reject: Option<i64>,
}

fn read_headshot(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read headshot file {}", path.display()))?;
    Ok(B64.encode(bytes))
}

fn print_results(results: &[ScoredMatch], limit: usize) {
    if results.is_empty() {
        println!("No candidates found.");
        return;
    }
    for (rank, m) in results.iter().take(limit).enumerate() {
        println!(
            "#{:<3} person_id={:<8} {} {}  score={:.4}",
            rank + 1,
            m.person_id(),
            m.record.first_name,
            m.record.last_name,
            m.score
        );
        let signals: Vec<String> = m
            .features
            .explanation()
            .into_iter()
            .map(|(name, value)| format!("{}={:.3}", name, value))
            .collect();
        println!("     {}", signals.join("  "));
        if m.flags.image_degraded {
            println!("     (image signal unavailable for this pair)");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    env_logger::init();

    let args = Args::parse();
    let config = MatchingConfig::from_env();
    config.log_config();

    let pool = db_connect::connect()
        .await
        .context("Failed to connect to Postgres")?;
    let embedder = Arc::new(HttpEmbeddingClient::new(&config.embedding_endpoint));
    let cache = create_shared_embedding_cache(config.embedding_cache_size);
    let model = ModelHandle::load(Path::new(&config.model_path)).with_context(|| {
        format!(
            "No usable model artifact at {}; run train_model first",
            config.model_path
        )
    })?;

    let query = QueryRecord {
        first_name: args.first.clone(),
        last_name: args.last.clone(),
        birth_date: args.dob,
        email: args.email.clone(),
        mdm_id: args.mdm.clone(),
        headshot_b64: args.headshot.as_deref().map(read_headshot).transpose()?,
        embedding: None,
    };

    let deps = PipelineDeps {
        pool,
        embedder,
        cache,
        model,
        config,
    };
    let results = run_search(&deps, query.clone()).await?;
    print_results(&results, args.limit);

    // An explicit decision on one of the returned matches feeds the
    // retraining loop.
    let decision = args
        .confirm
        .map(|id| (id, 1))
        .or_else(|| args.reject.map(|id| (id, 0)));
    if let Some((person_id, label)) = decision {
        let scored = results
            .iter()
            .find(|m| m.person_id() == person_id)
            .with_context(|| format!("person_id {} was not among the results", person_id))?;
        let feedback = FeedbackRecord {
            input_first: query.first_name,
            input_last: query.last_name,
            input_dob: query.birth_date,
            input_img: query.headshot_b64,
            matched_id: person_id,
            match_score: scored.score,
            label,
        };
        log_user_feedback(&deps.pool, &feedback).await?;
        info!("Feedback recorded for person_id {}", person_id);
        println!(
            "Recorded {} for person_id {}.",
            if label == 1 { "confirmation" } else { "rejection" },
            person_id
        );
    }

    Ok(())
}
