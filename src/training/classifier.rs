// src/training/classifier.rs

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::PairFeatures;

const DEFAULT_LEARNING_RATE: f64 = 0.1;
const DEFAULT_EPOCHS: usize = 300;

/// A logistic regression over the six pair features, trained by
/// gradient descent. Persisted as a serde JSON artifact with a
/// backup-before-promote convention.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchClassifier {
    // Six feature weights + 1 bias term.
    weights: Vec<f64>,
    learning_rate: f64,
    epochs: usize,
    pub version: u32,
    pub trained_at: Option<NaiveDateTime>,
}

fn sigmoid(logit: f64) -> f64 {
    1.0 / (1.0 + (-logit).exp())
}

impl MatchClassifier {
    /// Initializes an untrained model with zero weights. It predicts
    /// a neutral 0.5 for everything until fitted.
    pub fn new() -> Self {
        Self {
            weights: vec![0.0; PairFeatures::COUNT + 1],
            learning_rate: DEFAULT_LEARNING_RATE,
            epochs: DEFAULT_EPOCHS,
            version: 1,
            trained_at: None,
        }
    }

    /// Builds a model from explicit weights. Used to seed scoring in
    /// tests and bootstrap scenarios.
    pub fn from_weights(feature_weights: [f64; PairFeatures::COUNT], bias: f64) -> Self {
        let mut weights = feature_weights.to_vec();
        weights.push(bias);
        Self {
            weights,
            learning_rate: DEFAULT_LEARNING_RATE,
            epochs: DEFAULT_EPOCHS,
            version: 1,
            trained_at: None,
        }
    }

    /// Estimated match probability in [0,1]. Scoring never mutates
    /// the model.
    pub fn predict_proba(&self, features: &PairFeatures) -> f64 {
        let x = features.to_array();
        let logit: f64 = self
            .weights
            .iter()
            .zip(x.iter().chain(std::iter::once(&1.0)))
            .map(|(w, f)| w * f)
            .sum();
        sigmoid(logit)
    }

    /// Fits the model on labeled feature rows (labels in {0,1}),
    /// replacing any previous weights.
    pub fn fit(&mut self, rows: &[PairFeatures], labels: &[f64]) -> Result<()> {
        if rows.is_empty() {
            return Err(anyhow::anyhow!("Cannot fit on an empty training set"));
        }
        if rows.len() != labels.len() {
            return Err(anyhow::anyhow!(
                "Feature/label length mismatch: {} vs {}",
                rows.len(),
                labels.len()
            ));
        }

        self.weights = vec![0.0; PairFeatures::COUNT + 1];
        for _ in 0..self.epochs {
            for (features, &label) in rows.iter().zip(labels) {
                let prediction = self.predict_proba(features);
                let error = label - prediction;
                let x = features.to_array();
                for (i, feature_val) in x.iter().enumerate() {
                    self.weights[i] += self.learning_rate * error * feature_val;
                }
                let bias_index = self.weights.len() - 1;
                self.weights[bias_index] += self.learning_rate * error;
            }
        }

        self.trained_at = Some(Utc::now().naive_utc());
        info!(
            "Fitted classifier on {} rows ({} epochs, lr {})",
            rows.len(),
            self.epochs,
            self.learning_rate
        );
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact {}", path.display()))?;
        let model: MatchClassifier = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse model artifact {}", path.display()))?;
        if model.weights.len() != PairFeatures::COUNT + 1 {
            return Err(anyhow::anyhow!(
                "Model artifact has {} weights, expected {}",
                model.weights.len(),
                PairFeatures::COUNT + 1
            ));
        }
        info!(
            "Loaded classifier v{} from {}",
            model.version,
            path.display()
        );
        Ok(model)
    }

    /// Writes the artifact atomically (temp file + rename).
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let serialized =
            serde_json::to_string_pretty(self).context("Failed to serialize classifier")?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move artifact into place at {}", path.display()))?;
        info!("Saved classifier v{} to {}", self.version, path.display());
        Ok(())
    }

    pub fn backup_path(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dedup_model");
        path.with_file_name(format!("{}_backup.json", stem))
    }

    /// Promotes this model to the deployed artifact path. Any existing
    /// artifact is first copied aside, so a superseded model is
    /// retained, never deleted.
    pub fn promote_to(&self, path: &Path) -> Result<()> {
        if path.exists() {
            let backup = Self::backup_path(path);
            fs::copy(path, &backup).with_context(|| {
                format!("Failed to back up current artifact to {}", backup.display())
            })?;
            info!("Backed up previous artifact to {}", backup.display());
        } else {
            warn!(
                "No existing artifact at {}; promoting without backup",
                path.display()
            );
        }
        self.save_to_file(path)
    }
}

impl Default for MatchClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(sim: f64) -> PairFeatures {
        PairFeatures {
            first_name_sim: sim,
            last_name_sim: sim,
            birthdate_match: sim.round(),
            email_match: sim.round(),
            mdm_match: sim.round(),
            image_sim: sim,
        }
    }

    #[test]
    fn untrained_model_predicts_neutral() {
        let model = MatchClassifier::new();
        assert_eq!(model.predict_proba(&features(1.0)), 0.5);
    }

    #[test]
    fn fit_separates_obvious_positives_from_negatives() {
        let rows: Vec<PairFeatures> = (0..20)
            .map(|i| if i % 2 == 0 { features(1.0) } else { features(0.0) })
            .collect();
        let labels: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();

        let mut model = MatchClassifier::new();
        model.fit(&rows, &labels).unwrap();

        let strong = model.predict_proba(&features(1.0));
        let weak = model.predict_proba(&features(0.0));
        assert!(strong > 0.9, "strong match scored {}", strong);
        assert!(weak < 0.1, "non-match scored {}", weak);
    }

    #[test]
    fn prediction_is_idempotent_and_in_range() {
        let model = MatchClassifier::from_weights([1.0, 1.0, 1.0, 1.0, 1.0, 1.0], -3.0);
        let f = features(0.7);
        let first = model.predict_proba(&f);
        let second = model.predict_proba(&f);
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut model = MatchClassifier::new();
        assert!(model.fit(&[features(1.0)], &[1.0, 0.0]).is_err());
        assert!(model.fit(&[], &[]).is_err());
    }

    #[test]
    fn artifact_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup_model.json");

        let mut model = MatchClassifier::new();
        model
            .fit(&[features(1.0), features(0.0)], &[1.0, 0.0])
            .unwrap();
        model.save_to_file(&path).unwrap();

        let loaded = MatchClassifier::load_from_file(&path).unwrap();
        assert_eq!(model, loaded);
    }

    #[test]
    fn promote_preserves_the_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup_model.json");

        let old = MatchClassifier::from_weights([0.0; 6], 0.0);
        old.save_to_file(&path).unwrap();

        let mut new = MatchClassifier::from_weights([1.0; 6], -3.0);
        new.version = 2;
        new.promote_to(&path).unwrap();

        let deployed = MatchClassifier::load_from_file(&path).unwrap();
        assert_eq!(deployed.version, 2);
        let backup = MatchClassifier::load_from_file(&MatchClassifier::backup_path(&path)).unwrap();
        assert_eq!(backup, old);
    }
}
