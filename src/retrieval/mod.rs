// src/retrieval/mod.rs

pub mod text;
pub mod vector;

use std::collections::HashSet;

use tokio_postgres::Row as PgRow;

use crate::models::{Candidate, PersonRecord};

pub use text::{find_similar_textual, TextFilter};
pub use vector::{find_similar_faces, get_person_by_id};

pub(crate) fn person_from_row(row: &PgRow) -> PersonRecord {
    let embedding: Option<Vec<f32>> = row
        .try_get::<_, Option<pgvector::Vector>>("face_embedding")
        .ok()
        .flatten()
        .map(|v| v.to_vec());

    PersonRecord {
        person_id: row.get("person_id"),
        first_name: row.get("first_nm"),
        last_name: row.get("last_nm"),
        birth_date: row.get("birth_dt"),
        mdm_id: row.get("mdm_person_id"),
        email: row.get("email_address"),
        headshot_b64: row.get("headshot_b64"),
        embedding,
    }
}

/// Unions the two retrieval paths, deduplicated by `person_id`.
/// The vector-path rows come first so a duplicate keeps its distance.
pub fn merge_candidates(
    vector_results: Vec<Candidate>,
    text_results: Vec<Candidate>,
) -> Vec<Candidate> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut merged = Vec::with_capacity(vector_results.len() + text_results.len());

    for candidate in vector_results.into_iter().chain(text_results) {
        if seen.insert(candidate.person_id()) {
            merged.push(candidate);
        }
    }
    merged
}
