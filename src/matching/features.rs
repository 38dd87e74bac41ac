// src/matching/features.rs

use log::warn;
use strsim::normalized_levenshtein;

use crate::embedding::{embed_b64_cached, EmbeddingService, SharedEmbeddingCache};
use crate::models::{MatchFlags, MatchPair, PairFeatures};
use crate::utils::candle::cosine_similarity_candle;

/// Substring-tolerant normalized similarity in [0,1], case-insensitive.
/// The shorter string is slid across every equal-length window of the
/// longer one and the best normalized edit ratio wins, so
/// "Liz" vs "Elizabeth"-style containment still scores high.
pub fn partial_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let long_chars: Vec<char> = long.chars().collect();
    let short_len = short.chars().count();

    let mut best: f64 = 0.0;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(normalized_levenshtein(&short, &window));
        if best >= 1.0 {
            break;
        }
    }
    best
}

fn exact_match_opt(a: Option<&str>, b: Option<&str>, case_insensitive: bool) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            let equal = if case_insensitive {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            };
            if equal {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

async fn side_embedding(
    image_b64: Option<&str>,
    precomputed: Option<&[f32]>,
    embedder: &dyn EmbeddingService,
    cache: &SharedEmbeddingCache,
) -> Option<Vec<f32>> {
    if let Some(v) = precomputed {
        return Some(v.to_vec());
    }
    let b64 = image_b64.filter(|s| !s.is_empty())?;
    match embed_b64_cached(b64, embedder, cache).await {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Image embedding unavailable, zeroing image signal: {}", e);
            None
        }
    }
}

/// Computes the six pair signals. Missing inputs produce a neutral 0
/// for the affected signal plus a degradation flag, never an error;
/// identical inputs always produce identical features.
pub async fn extract_pair_features(
    pair: &MatchPair,
    a_embedding: Option<&[f32]>,
    b_embedding: Option<&[f32]>,
    embedder: &dyn EmbeddingService,
    cache: &SharedEmbeddingCache,
) -> (PairFeatures, MatchFlags) {
    let mut flags = MatchFlags::default();

    let first_name_sim = partial_similarity(&pair.a.first_name, &pair.b.first_name);
    let last_name_sim = partial_similarity(&pair.a.last_name, &pair.b.last_name);

    let birthdate_match = match (pair.a.birth_date, pair.b.birth_date) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    };
    let email_match = exact_match_opt(pair.a.email.as_deref(), pair.b.email.as_deref(), true);
    let mdm_match = exact_match_opt(pair.a.mdm_id.as_deref(), pair.b.mdm_id.as_deref(), false);

    let a_vec = side_embedding(pair.a.image_b64.as_deref(), a_embedding, embedder, cache).await;
    let b_vec = side_embedding(pair.b.image_b64.as_deref(), b_embedding, embedder, cache).await;

    let image_sim = match (a_vec, b_vec) {
        (Some(a), Some(b)) => match cosine_similarity_candle(&a, &b) {
            Ok(sim) => sim.clamp(0.0, 1.0),
            Err(e) => {
                warn!("Image similarity failed, zeroing image signal: {}", e);
                flags.image_degraded = true;
                0.0
            }
        },
        _ => {
            flags.image_degraded = true;
            0.0
        }
    };

    (
        PairFeatures {
            first_name_sim,
            last_name_sim,
            birthdate_match,
            email_match,
            mdm_match,
            image_sim,
        },
        flags,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::{FailingEmbedder, StubEmbedder};
    use crate::embedding::create_shared_embedding_cache;
    use crate::models::PairSide;
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
    use chrono::NaiveDate;

    fn side(first: &str, last: &str, dob: Option<&str>, email: Option<&str>, mdm: Option<&str>, img: Option<&str>) -> PairSide {
        PairSide {
            first_name: first.to_string(),
            last_name: last.to_string(),
            birth_date: dob.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            email: email.map(str::to_string),
            mdm_id: mdm.map(str::to_string),
            image_b64: img.map(str::to_string),
        }
    }

    fn assert_in_range(f: &PairFeatures) {
        for (name, value) in f.explanation() {
            assert!(
                (0.0..=1.0).contains(&value) && !value.is_nan(),
                "{} out of range: {}",
                name,
                value
            );
        }
    }

    #[tokio::test]
    async fn self_pair_has_all_exact_features_at_one() {
        let img = B64.encode(b"same picture");
        let s = side(
            "Anna",
            "Kowalski",
            Some("1980-01-01"),
            Some("anna@example.com"),
            Some("12345"),
            Some(&img),
        );
        let pair = MatchPair {
            a: s.clone(),
            b: s,
        };
        let embedder = StubEmbedder::new();
        let cache = create_shared_embedding_cache(8);

        let (f, flags) = extract_pair_features(&pair, None, None, &embedder, &cache).await;
        assert_eq!(f.first_name_sim, 1.0);
        assert_eq!(f.last_name_sim, 1.0);
        assert_eq!(f.birthdate_match, 1.0);
        assert_eq!(f.email_match, 1.0);
        assert_eq!(f.mdm_match, 1.0);
        assert!((f.image_sim - 1.0).abs() < 1e-6);
        assert!(!flags.image_degraded);
        assert_in_range(&f);
    }

    #[tokio::test]
    async fn missing_inputs_zero_features_without_error() {
        let pair = MatchPair {
            a: side("Anna", "Kowalski", None, None, None, None),
            b: side("Zofia", "Nowak", Some("1990-05-05"), Some("z@x.com"), Some("7"), None),
        };
        let embedder = StubEmbedder::new();
        let cache = create_shared_embedding_cache(8);

        let (f, flags) = extract_pair_features(&pair, None, None, &embedder, &cache).await;
        assert_eq!(f.birthdate_match, 0.0);
        assert_eq!(f.email_match, 0.0);
        assert_eq!(f.mdm_match, 0.0);
        assert_eq!(f.image_sim, 0.0);
        assert!(flags.image_degraded);
        assert_in_range(&f);
    }

    #[tokio::test]
    async fn embedding_failure_degrades_instead_of_erroring() {
        let img = B64.encode(b"picture");
        let pair = MatchPair {
            a: side("Anna", "Kowalski", None, None, None, Some(&img)),
            b: side("Anna", "Kowalski", None, None, None, Some(&img)),
        };
        let cache = create_shared_embedding_cache(8);

        let (f, flags) = extract_pair_features(&pair, None, None, &FailingEmbedder, &cache).await;
        assert_eq!(f.image_sim, 0.0);
        assert!(flags.image_degraded);
        // Text signals are unaffected by the failed image path.
        assert_eq!(f.first_name_sim, 1.0);
    }

    #[tokio::test]
    async fn precomputed_embeddings_bypass_the_service() {
        let mut a = vec![0.0f32; crate::models::EMBEDDING_DIM];
        a[0] = 1.0;
        let b = a.clone();
        let pair = MatchPair {
            a: side("Anna", "K", None, None, None, None),
            b: side("Anna", "K", None, None, None, None),
        };
        let cache = create_shared_embedding_cache(8);

        let (f, flags) =
            extract_pair_features(&pair, Some(&a), Some(&b), &FailingEmbedder, &cache).await;
        assert!((f.image_sim - 1.0).abs() < 1e-6);
        assert!(!flags.image_degraded);
    }

    #[test]
    fn partial_similarity_tolerates_containment() {
        assert_eq!(partial_similarity("anna", "ANNA"), 1.0);
        assert_eq!(partial_similarity("liz", "xxlizxx"), 1.0);
        assert_eq!(partial_similarity("", "anna"), 0.0);
        let sim = partial_similarity("anna", "anne");
        assert!(sim > 0.5 && sim < 1.0);
    }

    #[tokio::test]
    async fn identical_pairs_produce_identical_features() {
        let pair = MatchPair {
            a: side("Anna", "Kowalski", Some("1980-01-01"), None, None, None),
            b: side("Ana", "Kowalsky", Some("1980-01-01"), None, None, None),
        };
        let embedder = StubEmbedder::new();
        let cache = create_shared_embedding_cache(8);

        let (f1, _) = extract_pair_features(&pair, None, None, &embedder, &cache).await;
        let (f2, _) = extract_pair_features(&pair, None, None, &embedder, &cache).await;
        assert_eq!(f1, f2);
    }
}
