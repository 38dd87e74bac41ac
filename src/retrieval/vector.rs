// src/retrieval/vector.rs

use anyhow::{Context, Result};
use log::debug;
use pgvector::Vector as PgVector;

use crate::models::Candidate;
use crate::models::PersonRecord;
use crate::retrieval::person_from_row;
use crate::utils::db_connect::PgPool;

/// Nearest-neighbor retrieval over the face embedding column.
///
/// Runs in the store's native vector index; ordering is ascending
/// distance with `person_id` as the tie-break, so identical queries
/// against the same population return the same ordering.
pub async fn find_similar_faces(
    pool: &PgPool,
    embedding: &[f32],
    top_k: i64,
) -> Result<Vec<Candidate>> {
    let conn = pool
        .get()
        .await
        .context("Vector retrieval: failed to get DB connection")?;

    let query_vec = PgVector::from(embedding.to_vec());

    let rows = conn
        .query(
            "SELECT person_id, first_nm, last_nm, birth_dt, mdm_person_id,
                    email_address, headshot_b64, face_embedding,
                    (face_embedding <-> $1)::DOUBLE PRECISION AS distance
             FROM people_with_faces
             WHERE face_embedding IS NOT NULL
             ORDER BY face_embedding <-> $1, person_id
             LIMIT $2",
            &[&query_vec, &top_k],
        )
        .await
        .context("Vector retrieval query failed")?;

    debug!("Vector retrieval returned {} candidates", rows.len());

    Ok(rows
        .iter()
        .map(|row| Candidate {
            record: person_from_row(row),
            distance: Some(row.get::<_, f64>("distance")),
            text_score: None,
        })
        .collect())
}

/// Fetches a single reference record by `person_id`. Used when the
/// retrain loop reconstructs pairs from feedback rows.
pub async fn get_person_by_id(pool: &PgPool, person_id: i64) -> Result<Option<PersonRecord>> {
    let conn = pool
        .get()
        .await
        .context("Record fetch: failed to get DB connection")?;

    let row_opt = conn
        .query_opt(
            "SELECT person_id, first_nm, last_nm, birth_dt, mdm_person_id,
                    email_address, headshot_b64, face_embedding
             FROM people_with_faces
             WHERE person_id = $1",
            &[&person_id],
        )
        .await
        .context("Record fetch query failed")?;

    Ok(row_opt.as_ref().map(person_from_row))
}
