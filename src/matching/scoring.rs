// src/matching/scoring.rs

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::models::{Candidate, MatchFlags, PairFeatures, ScoredMatch};
use crate::training::classifier::MatchClassifier;

/// Explicitly owned handle to the deployed classifier. Loaded once,
/// shared across in-flight requests; scoring takes a read lock,
/// retrain-and-swap takes the write lock, so concurrent readers see
/// either the fully-old or fully-new model.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<RwLock<MatchClassifier>>,
    path: PathBuf,
    retrain_lock: Arc<Mutex<()>>,
}

impl ModelHandle {
    pub fn load(path: &Path) -> Result<Self> {
        let classifier = MatchClassifier::load_from_file(path)?;
        Ok(Self::from_classifier(path, classifier))
    }

    pub fn from_classifier(path: &Path, classifier: MatchClassifier) -> Self {
        Self {
            model: Arc::new(RwLock::new(classifier)),
            path: path.to_path_buf(),
            retrain_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn version(&self) -> u32 {
        self.model.read().await.version
    }

    pub async fn predict_proba(&self, features: &PairFeatures) -> f64 {
        self.model.read().await.predict_proba(features)
    }

    /// Atomically replaces the deployed model for all subsequent
    /// scoring calls.
    pub async fn swap(&self, new_model: MatchClassifier) {
        let mut guard = self.model.write().await;
        *guard = new_model;
    }

    /// Serializes retraining: at most one retrain runs at a time.
    pub async fn begin_retrain(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.retrain_lock).lock_owned().await
    }
}

/// Scores candidate pairs and ranks them by match probability
/// descending, tie-break `person_id` ascending. The feature values
/// travel with each result for explanation.
pub async fn score_candidates(
    handle: &ModelHandle,
    inputs: Vec<(Candidate, PairFeatures, MatchFlags)>,
) -> Vec<ScoredMatch> {
    let model = handle.model.read().await;

    let mut scored: Vec<ScoredMatch> = inputs
        .into_iter()
        .map(|(candidate, features, flags)| ScoredMatch {
            score: model.predict_proba(&features),
            record: candidate.record,
            features,
            flags,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.person_id().cmp(&b.person_id()))
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersonRecord;

    fn candidate(id: i64) -> Candidate {
        Candidate {
            record: PersonRecord {
                person_id: id,
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                birth_date: None,
                mdm_id: None,
                email: None,
                headshot_b64: None,
                embedding: None,
            },
            distance: None,
            text_score: None,
        }
    }

    fn features(sim: f64) -> PairFeatures {
        PairFeatures {
            first_name_sim: sim,
            last_name_sim: sim,
            birthdate_match: 0.0,
            email_match: 0.0,
            mdm_match: 0.0,
            image_sim: 0.0,
        }
    }

    fn handle() -> ModelHandle {
        let classifier = MatchClassifier::from_weights([2.0, 2.0, 1.0, 1.0, 1.0, 1.0], -2.0);
        ModelHandle::from_classifier(Path::new("unused.json"), classifier)
    }

    #[tokio::test]
    async fn ranking_is_descending_by_score() {
        let h = handle();
        let scored = score_candidates(
            &h,
            vec![
                (candidate(1), features(0.1), MatchFlags::default()),
                (candidate(2), features(0.9), MatchFlags::default()),
            ],
        )
        .await;
        assert_eq!(scored[0].person_id(), 2);
        assert!(scored[0].score > scored[1].score);
    }

    #[tokio::test]
    async fn ties_break_by_person_id_ascending() {
        let h = handle();
        let scored = score_candidates(
            &h,
            vec![
                (candidate(7), features(0.5), MatchFlags::default()),
                (candidate(3), features(0.5), MatchFlags::default()),
            ],
        )
        .await;
        let ids: Vec<i64> = scored.iter().map(|s| s.person_id()).collect();
        assert_eq!(ids, vec![3, 7]);
    }

    #[tokio::test]
    async fn scoring_is_idempotent_without_a_model_change() {
        let h = handle();
        let f = features(0.6);
        let first = h.predict_proba(&f).await;
        let second = h.predict_proba(&f).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn swap_changes_subsequent_scores_atomically() {
        let h = handle();
        let f = features(1.0);
        let before = h.predict_proba(&f).await;
        h.swap(MatchClassifier::from_weights([0.0; 6], 0.0)).await;
        let after = h.predict_proba(&f).await;
        assert_ne!(before, after);
        assert_eq!(after, 0.5);
    }
}
