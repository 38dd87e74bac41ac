// src/retrieval/text.rs

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::debug;
use postgres_types::ToSql;

use crate::models::Candidate;
use crate::retrieval::person_from_row;
use crate::utils::db_connect::PgPool;

/// Filter fields for textual blocking. Name/email/mdm match by
/// case-insensitive prefix; birth date matches exactly.
#[derive(Debug, Clone, Default)]
pub struct TextFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mdm_id: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl TextFilter {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.mdm_id.is_none()
            && self.birth_date.is_none()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Textual blocking over the reference population. An empty filter set
/// returns an empty result; retrieval never falls back to a full scan.
pub async fn find_similar_textual(
    pool: &PgPool,
    filter: &TextFilter,
    top_k: i64,
) -> Result<Vec<Candidate>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();

    if let Some(first) = non_empty(&filter.first_name) {
        params.push(Box::new(format!("{}%", first)));
        clauses.push(format!("first_nm ILIKE ${}", params.len()));
    }
    if let Some(last) = non_empty(&filter.last_name) {
        params.push(Box::new(format!("{}%", last)));
        clauses.push(format!("last_nm ILIKE ${}", params.len()));
    }
    if let Some(email) = non_empty(&filter.email) {
        params.push(Box::new(format!("{}%", email)));
        clauses.push(format!("email_address ILIKE ${}", params.len()));
    }
    if let Some(mdm) = non_empty(&filter.mdm_id) {
        params.push(Box::new(format!("{}%", mdm)));
        clauses.push(format!("mdm_person_id ILIKE ${}", params.len()));
    }
    if let Some(dob) = filter.birth_date {
        params.push(Box::new(dob));
        clauses.push(format!("birth_dt = ${}", params.len()));
    }

    if clauses.is_empty() {
        debug!("Textual retrieval skipped: no filter fields supplied");
        return Ok(Vec::new());
    }

    params.push(Box::new(top_k));
    let query = format!(
        "SELECT person_id, first_nm, last_nm, birth_dt, mdm_person_id,
                email_address, headshot_b64, face_embedding
         FROM people_with_faces
         WHERE {}
         ORDER BY person_id
         LIMIT ${}",
        clauses.join(" OR "),
        params.len()
    );

    let conn = pool
        .get()
        .await
        .context("Textual retrieval: failed to get DB connection")?;

    let param_refs: Vec<&(dyn ToSql + Sync)> = params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect();

    let rows = conn
        .query(query.as_str(), &param_refs)
        .await
        .context("Textual retrieval query failed")?;

    debug!("Textual retrieval returned {} candidates", rows.len());

    Ok(rows
        .iter()
        .map(|row| Candidate {
            record: person_from_row(row),
            distance: None,
            text_score: None,
        })
        .collect())
}
