// src/training/feedback.rs

use anyhow::{Context, Result};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

use crate::embedding::{EmbeddingService, SharedEmbeddingCache};
use crate::matching::features::extract_pair_features;
use crate::matching::scoring::ModelHandle;
use crate::models::{FeedbackRecord, MatchPair, PairFeatures, PairSide};
use crate::retrieval::get_person_by_id;
use crate::training::classifier::MatchClassifier;
use crate::training::trainer::{train_and_evaluate, EvalReport};
use crate::utils::config::MatchingConfig;
use crate::utils::db_connect::PgPool;

/// Creates the append-only feedback log if it does not exist yet.
pub async fn ensure_feedback_table(pool: &PgPool) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Feedback: failed to get DB connection")?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_feedback_log (
            id BIGSERIAL PRIMARY KEY,
            input_first TEXT NOT NULL,
            input_last TEXT NOT NULL,
            input_dob DATE,
            input_img TEXT,
            matched_id BIGINT NOT NULL,
            match_score DOUBLE PRECISION NOT NULL,
            label INT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        &[],
    )
    .await
    .context("Failed to create user_feedback_log table")?;
    Ok(())
}

/// Appends one confirm/reject decision. Existing rows are never
/// updated or deleted.
pub async fn log_user_feedback(pool: &PgPool, record: &FeedbackRecord) -> Result<()> {
    ensure_feedback_table(pool).await?;
    let conn = pool
        .get()
        .await
        .context("Feedback: failed to get DB connection")?;
    conn.execute(
        "INSERT INTO user_feedback_log
            (input_first, input_last, input_dob, input_img, matched_id, match_score, label)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
        &[
            &record.input_first,
            &record.input_last,
            &record.input_dob,
            &record.input_img,
            &record.matched_id,
            &record.match_score,
            &record.label,
        ],
    )
    .await
    .context("Failed to insert feedback row")?;
    info!(
        "Logged feedback: matched_id={} label={}",
        record.matched_id, record.label
    );
    Ok(())
}

pub async fn fetch_feedback_rows(pool: &PgPool) -> Result<Vec<FeedbackRecord>> {
    let conn = pool
        .get()
        .await
        .context("Feedback: failed to get DB connection")?;
    let rows = conn
        .query(
            "SELECT input_first, input_last, input_dob, input_img,
                    matched_id, match_score, label
             FROM user_feedback_log
             ORDER BY id",
            &[],
        )
        .await
        .context("Failed to read user_feedback_log")?;

    Ok(rows
        .into_iter()
        .map(|row| FeedbackRecord {
            input_first: row.get("input_first"),
            input_last: row.get("input_last"),
            input_dob: row.get("input_dob"),
            input_img: row.get("input_img"),
            matched_id: row.get("matched_id"),
            match_score: row.get("match_score"),
            label: row.get("label"),
        })
        .collect())
}

/// Result of one retrain attempt. Only `Promoted` changes the deployed
/// model; the other outcomes leave it untouched.
#[derive(Debug)]
pub enum RetrainOutcome {
    /// Not enough feedback accumulated yet.
    Skipped { found: usize, required: usize },
    /// The candidate model trained but fell below the promotion gate.
    RejectedQuality { report: EvalReport },
    /// The candidate model replaced the deployed one.
    Promoted { report: EvalReport, version: u32 },
}

/// Decides promotion against the optional quality gate on the
/// positive-class F1. No configured gate means every candidate
/// promotes.
fn passes_promotion_gate(report: &EvalReport, min_f1: Option<f64>) -> bool {
    match min_f1 {
        Some(min) => report.positive.f1 >= min,
        None => true,
    }
}

/// Rebuilds feature rows from the feedback log. The query side of a
/// feedback row never carried email or MDM identifiers, so those
/// signals are absent by construction.
async fn feedback_samples(
    pool: &PgPool,
    feedback: &[FeedbackRecord],
    embedder: &dyn EmbeddingService,
    cache: &SharedEmbeddingCache,
) -> Result<Vec<(PairFeatures, f64)>> {
    let mut samples = Vec::with_capacity(feedback.len());
    for record in feedback {
        let person = match get_person_by_id(pool, record.matched_id).await? {
            Some(p) => p,
            None => {
                warn!(
                    "Feedback references missing person {}; skipping row",
                    record.matched_id
                );
                continue;
            }
        };
        let pair = MatchPair {
            a: PairSide {
                first_name: record.input_first.clone(),
                last_name: record.input_last.clone(),
                birth_date: record.input_dob,
                email: None,
                mdm_id: None,
                image_b64: record.input_img.clone(),
            },
            b: PairSide::from_person(&person),
        };
        let (features, _) =
            extract_pair_features(&pair, None, person.embedding.as_deref(), embedder, cache).await;
        samples.push((features, record.label as f64));
    }
    Ok(samples)
}

/// Retrains from accumulated feedback and promotes the result if it
/// clears the quality gate. Serialized through the handle's retrain
/// lock; the deployed model keeps serving reads throughout.
pub async fn retrain_from_feedback(
    pool: &PgPool,
    embedder: Arc<dyn EmbeddingService>,
    cache: &SharedEmbeddingCache,
    handle: &ModelHandle,
    config: &MatchingConfig,
) -> Result<RetrainOutcome> {
    let _retrain_guard = handle.begin_retrain().await;

    ensure_feedback_table(pool).await?;
    let feedback = fetch_feedback_rows(pool).await?;
    if feedback.len() < config.min_feedback {
        info!(
            "Retrain skipped: {} feedback rows, {} required",
            feedback.len(),
            config.min_feedback
        );
        return Ok(RetrainOutcome::Skipped {
            found: feedback.len(),
            required: config.min_feedback,
        });
    }

    let samples = feedback_samples(pool, &feedback, embedder.as_ref(), cache).await?;
    retrain_on_samples(samples, handle, config).await
}

/// Trains a candidate from already-extracted samples and promotes it
/// when it clears the gate. The sufficiency check lives here so a
/// feedback set that loses rows to missing persons still falls under
/// it; too few samples is a no-op that leaves the artifact untouched.
pub async fn retrain_on_samples(
    samples: Vec<(PairFeatures, f64)>,
    handle: &ModelHandle,
    config: &MatchingConfig,
) -> Result<RetrainOutcome> {
    if samples.len() < config.min_feedback {
        info!(
            "Retrain skipped: {} usable samples, {} required",
            samples.len(),
            config.min_feedback
        );
        return Ok(RetrainOutcome::Skipped {
            found: samples.len(),
            required: config.min_feedback,
        });
    }

    let mut rng = StdRng::from_entropy();
    let (mut candidate, report) = train_and_evaluate(samples, &mut rng)?;

    if !passes_promotion_gate(&report, config.min_promote_f1) {
        warn!(
            "Candidate model rejected: match F1 {:.3} below gate {:.3}",
            report.positive.f1,
            config.min_promote_f1.unwrap_or(0.0)
        );
        return Ok(RetrainOutcome::RejectedQuality { report });
    }

    let version = handle.version().await + 1;
    candidate.version = version;
    candidate.promote_to(handle.path())?;
    handle.swap(candidate).await;
    info!("Promoted retrained model v{}", version);
    Ok(RetrainOutcome::Promoted { report, version })
}
