// src/training/trainer.rs

use anyhow::Result;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

use crate::models::PairFeatures;
use crate::training::classifier::MatchClassifier;

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
const DECISION_THRESHOLD: f64 = 0.5;

/// Precision/recall/F1 for one class of the binary decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Holdout evaluation of a fitted classifier at the 0.5 threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub accuracy: f64,
    pub positive: ClassMetrics,
    pub negative: ClassMetrics,
    pub evaluated_on: usize,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "accuracy {:.3} on {} rows",
            self.accuracy, self.evaluated_on
        )?;
        for (name, m) in [("match", &self.positive), ("non-match", &self.negative)] {
            writeln!(
                f,
                "  {:<9} precision {:.3}  recall {:.3}  f1 {:.3}  support {}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Shuffles and splits labeled rows into (train, test). The test side
/// gets `test_fraction` of the rows, rounded down but never the whole
/// set.
pub fn split_train_test<T>(
    mut rows: Vec<T>,
    test_fraction: f64,
    rng: &mut impl Rng,
) -> (Vec<T>, Vec<T>) {
    rows.shuffle(rng);
    let test_len = ((rows.len() as f64 * test_fraction) as usize).min(rows.len().saturating_sub(1));
    let train = rows.split_off(test_len);
    (train, rows)
}

/// Scores each row at the decision threshold and tallies per-class
/// precision, recall and F1.
pub fn evaluate(
    model: &MatchClassifier,
    rows: &[PairFeatures],
    labels: &[f64],
) -> EvalReport {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut tn = 0usize;
    let mut fn_ = 0usize;

    for (features, &label) in rows.iter().zip(labels) {
        let predicted = model.predict_proba(features) >= DECISION_THRESHOLD;
        let actual = label >= DECISION_THRESHOLD;
        match (predicted, actual) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let pos_precision = ratio(tp, tp + fp);
    let pos_recall = ratio(tp, tp + fn_);
    let neg_precision = ratio(tn, tn + fn_);
    let neg_recall = ratio(tn, tn + fp);

    EvalReport {
        accuracy: ratio(tp + tn, rows.len()),
        positive: ClassMetrics {
            precision: pos_precision,
            recall: pos_recall,
            f1: f1(pos_precision, pos_recall),
            support: tp + fn_,
        },
        negative: ClassMetrics {
            precision: neg_precision,
            recall: neg_recall,
            f1: f1(neg_precision, neg_recall),
            support: tn + fp,
        },
        evaluated_on: rows.len(),
    }
}

/// Fits a fresh classifier on a shuffled train split and reports its
/// holdout quality. When the set is too small to hold anything out the
/// report is computed on the training rows.
pub fn train_and_evaluate(
    samples: Vec<(PairFeatures, f64)>,
    rng: &mut impl Rng,
) -> Result<(MatchClassifier, EvalReport)> {
    let (train, test) = split_train_test(samples, DEFAULT_TEST_FRACTION, rng);

    let (train_rows, train_labels): (Vec<PairFeatures>, Vec<f64>) = train.into_iter().unzip();
    let mut model = MatchClassifier::new();
    model.fit(&train_rows, &train_labels)?;

    let report = if test.is_empty() {
        info!("No holdout rows; evaluating on the training split");
        evaluate(&model, &train_rows, &train_labels)
    } else {
        let (test_rows, test_labels): (Vec<PairFeatures>, Vec<f64>) = test.into_iter().unzip();
        evaluate(&model, &test_rows, &test_labels)
    };
    info!("Evaluation:\n{}", report);
    Ok((model, report))
}
