// src/models/core.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Dimensionality of the face embedding column.
pub const EMBEDDING_DIM: usize = 512;

/// A reference identity as stored in `people_with_faces`.
///
/// `embedding` is absent until the headshot has been run through the
/// embedding service; that state is valid and never an error.
#[derive(Debug, Clone)]
pub struct PersonRecord {
    pub person_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub mdm_id: Option<String>,
    pub email: Option<String>,
    pub headshot_b64: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// A transient search request. Same shape as a reference record minus
/// the identity key; never persisted.
#[derive(Debug, Clone, Default)]
pub struct QueryRecord {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub mdm_id: Option<String>,
    pub email: Option<String>,
    pub headshot_b64: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// A reference record proposed as a possible match, annotated with the
/// signal of whichever retrieval path produced it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: PersonRecord,
    /// Vector-path distance (ascending is better). None if this row
    /// came from textual blocking only.
    pub distance: Option<f64>,
    /// Lexical rerank score (descending is better). Filled by the
    /// reranker.
    pub text_score: Option<f64>,
}

impl Candidate {
    pub fn person_id(&self) -> i64 {
        self.record.person_id
    }
}

/// One side of a comparison pair. Identity fields are always present
/// for scoring; the image is optional.
#[derive(Debug, Clone, Default)]
pub struct PairSide {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub email: Option<String>,
    pub mdm_id: Option<String>,
    pub image_b64: Option<String>,
}

impl PairSide {
    pub fn from_query(q: &QueryRecord) -> Self {
        Self {
            first_name: q.first_name.clone(),
            last_name: q.last_name.clone(),
            birth_date: q.birth_date,
            email: q.email.clone(),
            mdm_id: q.mdm_id.clone(),
            image_b64: q.headshot_b64.clone(),
        }
    }

    pub fn from_person(p: &PersonRecord) -> Self {
        Self {
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            birth_date: p.birth_date,
            email: p.email.clone(),
            mdm_id: p.mdm_id.clone(),
            image_b64: p.headshot_b64.clone(),
        }
    }
}

/// A (query, candidate) or (record, record) comparison pair.
#[derive(Debug, Clone)]
pub struct MatchPair {
    pub a: PairSide,
    pub b: PairSide,
}

/// Provenance tag for synthesized training pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairVariant {
    Standard,
    MissingImg,
    Nickname,
    Hybrid,
    Rotated,
    Rotated180,
    Random,
}

impl PairVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairVariant::Standard => "standard",
            PairVariant::MissingImg => "missing_img",
            PairVariant::Nickname => "nickname",
            PairVariant::Hybrid => "hybrid",
            PairVariant::Rotated => "rotated",
            PairVariant::Rotated180 => "rotated_180",
            PairVariant::Random => "random",
        }
    }
}

/// A labeled pair as persisted to the flat training artifact. Column
/// layout mirrors the pair schema plus `match`/`type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPairRow {
    pub a_id: i64,
    pub b_id: i64,
    pub a_first: String,
    pub b_first: String,
    pub a_last: String,
    pub b_last: String,
    pub a_birth: Option<NaiveDate>,
    pub b_birth: Option<NaiveDate>,
    pub a_email: Option<String>,
    pub b_email: Option<String>,
    pub a_mdm: Option<String>,
    pub b_mdm: Option<String>,
    pub a_img: Option<String>,
    pub b_img: Option<String>,
    #[serde(rename = "match")]
    pub label: i32,
    #[serde(rename = "type")]
    pub variant: PairVariant,
}

impl TrainingPairRow {
    pub fn to_pair(&self) -> MatchPair {
        MatchPair {
            a: PairSide {
                first_name: self.a_first.clone(),
                last_name: self.a_last.clone(),
                birth_date: self.a_birth,
                email: self.a_email.clone(),
                mdm_id: self.a_mdm.clone(),
                image_b64: self.a_img.clone(),
            },
            b: PairSide {
                first_name: self.b_first.clone(),
                last_name: self.b_last.clone(),
                birth_date: self.b_birth,
                email: self.b_email.clone(),
                mdm_id: self.b_mdm.clone(),
                image_b64: self.b_img.clone(),
            },
        }
    }
}

/// One human confirm/reject decision on a scored match. Append-only.
#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    pub input_first: String,
    pub input_last: String,
    pub input_dob: Option<NaiveDate>,
    pub input_img: Option<String>,
    pub matched_id: i64,
    pub match_score: f64,
    pub label: i32,
}
