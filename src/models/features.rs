// src/models/features.rs

use serde::{Deserialize, Serialize};

use crate::models::core::PersonRecord;

/// The six signals the classifier consumes, one row per pair.
///
/// Every field is well-defined under missing inputs: absent data
/// contributes 0, never an error or NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairFeatures {
    pub first_name_sim: f64,
    pub last_name_sim: f64,
    pub birthdate_match: f64,
    pub email_match: f64,
    pub mdm_match: f64,
    pub image_sim: f64,
}

impl PairFeatures {
    pub const COUNT: usize = 6;

    pub const NAMES: [&'static str; Self::COUNT] = [
        "first_name_sim",
        "last_name_sim",
        "birthdate_match",
        "email_match",
        "mdm_match",
        "image_sim",
    ];

    pub fn to_array(&self) -> [f64; Self::COUNT] {
        [
            self.first_name_sim,
            self.last_name_sim,
            self.birthdate_match,
            self.email_match,
            self.mdm_match,
            self.image_sim,
        ]
    }

    /// Feature name → value pairs for operator-facing explanations.
    pub fn explanation(&self) -> Vec<(&'static str, f64)> {
        Self::NAMES.iter().copied().zip(self.to_array()).collect()
    }
}

/// Per-result degradation provenance. A zeroed signal caused by a
/// failure is distinguishable from a true low-similarity pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFlags {
    /// The image signal was zeroed because an image or its embedding
    /// was unavailable or failed to compute.
    pub image_degraded: bool,
    /// The nickname table was unreachable; names were only case-folded.
    pub nickname_degraded: bool,
}

/// A fully scored candidate: match probability plus the raw feature
/// values that produced it.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub record: PersonRecord,
    pub score: f64,
    pub features: PairFeatures,
    pub flags: MatchFlags,
}

impl ScoredMatch {
    pub fn person_id(&self) -> i64 {
        self.record.person_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explanation_covers_all_six_signals() {
        let f = PairFeatures {
            first_name_sim: 0.5,
            last_name_sim: 1.0,
            birthdate_match: 1.0,
            email_match: 0.0,
            mdm_match: 1.0,
            image_sim: 0.25,
        };
        let exp = f.explanation();
        assert_eq!(exp.len(), PairFeatures::COUNT);
        assert_eq!(exp[0], ("first_name_sim", 0.5));
        assert_eq!(exp[5], ("image_sim", 0.25));
    }
}
