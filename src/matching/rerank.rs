// src/matching/rerank.rs

use strsim::normalized_levenshtein;

use crate::models::{Candidate, QueryRecord};

// Fixed design weights for the cheap pre-filter ordering; these are
// not learned parameters.
const FIRST_NAME_WEIGHT: f64 = 0.25;
const LAST_NAME_WEIGHT: f64 = 0.25;
const EMAIL_WEIGHT: f64 = 0.20;
const MDM_WEIGHT: f64 = 0.30;

fn seq_ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

fn text_score(query: &QueryRecord, candidate: &Candidate) -> f64 {
    let record = &candidate.record;
    let mut score = 0.0;

    if !query.first_name.is_empty() && !record.first_name.is_empty() {
        score += seq_ratio(&query.first_name, &record.first_name) * FIRST_NAME_WEIGHT;
    }
    if !query.last_name.is_empty() && !record.last_name.is_empty() {
        score += seq_ratio(&query.last_name, &record.last_name) * LAST_NAME_WEIGHT;
    }
    if let (Some(qe), Some(re)) = (query.email.as_deref(), record.email.as_deref()) {
        if !qe.is_empty() && !re.is_empty() {
            score += seq_ratio(qe, re) * EMAIL_WEIGHT;
        }
    }
    if let (Some(qm), Some(rm)) = (query.mdm_id.as_deref(), record.mdm_id.as_deref()) {
        if !qm.is_empty() && !rm.is_empty() && qm == rm {
            score += MDM_WEIGHT;
        }
    }

    score
}

/// Assigns each candidate a weighted lexical score and reorders the
/// set by `text_score` descending (tie-break `person_id` ascending)
/// before the expensive feature extraction and model scoring.
pub fn rerank_with_text(query: &QueryRecord, candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        candidate.text_score = Some(text_score(query, candidate));
    }
    candidates.sort_by(|a, b| {
        let sa = a.text_score.unwrap_or(0.0);
        let sb = b.text_score.unwrap_or(0.0);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.person_id().cmp(&b.person_id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersonRecord;

    fn candidate(id: i64, first: &str, last: &str, email: Option<&str>, mdm: Option<&str>) -> Candidate {
        Candidate {
            record: PersonRecord {
                person_id: id,
                first_name: first.to_string(),
                last_name: last.to_string(),
                birth_date: None,
                mdm_id: mdm.map(str::to_string),
                email: email.map(str::to_string),
                headshot_b64: None,
                embedding: None,
            },
            distance: None,
            text_score: None,
        }
    }

    fn query(first: &str, last: &str, email: Option<&str>, mdm: Option<&str>) -> QueryRecord {
        QueryRecord {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.map(str::to_string),
            mdm_id: mdm.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn exact_match_on_all_fields_scores_full_weight() {
        let q = query("anna", "kowalski", Some("a@x.com"), Some("42"));
        let mut cands = vec![candidate(1, "anna", "kowalski", Some("a@x.com"), Some("42"))];
        rerank_with_text(&q, &mut cands);
        assert!((cands[0].text_score.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_contribute_nothing() {
        let q = query("anna", "kowalski", None, None);
        let mut cands = vec![candidate(1, "anna", "kowalski", Some("a@x.com"), Some("42"))];
        rerank_with_text(&q, &mut cands);
        // Only the two name terms can contribute.
        assert!((cands[0].text_score.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mdm_equality_is_binary() {
        let q = query("", "", None, Some("42"));
        let mut cands = vec![
            candidate(1, "", "", None, Some("43")),
            candidate(2, "", "", None, Some("42")),
        ];
        rerank_with_text(&q, &mut cands);
        assert_eq!(cands[0].person_id(), 2);
        assert!((cands[0].text_score.unwrap() - 0.30).abs() < 1e-9);
        assert_eq!(cands[1].text_score, Some(0.0));
    }

    #[test]
    fn ordering_is_descending_with_person_id_tiebreak() {
        let q = query("anna", "kowalski", None, None);
        let mut cands = vec![
            candidate(9, "anna", "kowalski", None, None),
            candidate(3, "anna", "kowalski", None, None),
            candidate(5, "zofia", "nowak", None, None),
        ];
        rerank_with_text(&q, &mut cands);
        let ids: Vec<i64> = cands.iter().map(|c| c.person_id()).collect();
        assert_eq!(ids, vec![3, 9, 5]);
    }
}
