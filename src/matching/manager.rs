// src/matching/manager.rs

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::{embed_b64_cached, EmbeddingService, SharedEmbeddingCache};
use crate::matching::features::extract_pair_features;
use crate::matching::normalize::{normalize_name, try_load_nickname_map, NicknameMap};
use crate::matching::rerank::rerank_with_text;
use crate::matching::scoring::{score_candidates, ModelHandle};
use crate::models::{MatchPair, PairSide, QueryRecord, ScoredMatch};
use crate::retrieval::{find_similar_faces, find_similar_textual, merge_candidates, TextFilter};
use crate::utils::config::MatchingConfig;
use crate::utils::db_connect::PgPool;

const FEATURE_EXTRACTION_CONCURRENCY: usize = 8;

/// Shared collaborators for the search pipeline. Independent requests
/// share only the model handle and the embedding cache, both safe for
/// concurrent use.
pub struct PipelineDeps {
    pub pool: PgPool,
    pub embedder: Arc<dyn EmbeddingService>,
    pub cache: SharedEmbeddingCache,
    pub model: ModelHandle,
    pub config: MatchingConfig,
}

/// Runs one search request end to end: normalize, retrieve (vector
/// plus textual), merge, rerank, extract features, score. Returns
/// matches ranked by match probability descending.
pub async fn run_search(deps: &PipelineDeps, query: QueryRecord) -> Result<Vec<ScoredMatch>> {
    let request_id = Uuid::new_v4();
    info!(
        "[{}] Search request: first='{}' last='{}' dob={:?} headshot={}",
        request_id,
        query.first_name,
        query.last_name,
        query.birth_date,
        query.headshot_b64.is_some(),
    );

    // Normalize the given name before any similarity computation. An
    // unreachable nickname table degrades to case-folding only.
    let (nickname_map, nickname_degraded) = match try_load_nickname_map(&deps.pool).await {
        Ok(map) => (map, false),
        Err(e) => {
            warn!(
                "[{}] Nickname table unreachable, case-fold only: {}",
                request_id, e
            );
            (NicknameMap::new(), true)
        }
    };
    let mut query = query;
    query.first_name = normalize_name(&query.first_name, &nickname_map);

    // Query-side embedding, computed once per request. Failure drops
    // the image signal for every candidate pair.
    if query.embedding.is_none() {
        if let Some(b64) = query.headshot_b64.clone() {
            match embed_b64_cached(&b64, deps.embedder.as_ref(), &deps.cache).await {
                Ok(v) => query.embedding = Some(v),
                Err(e) => {
                    warn!(
                        "[{}] Query image embedding failed, continuing without image signal: {}",
                        request_id, e
                    );
                    query.headshot_b64 = None;
                }
            }
        }
    }

    let vector_results = match &query.embedding {
        Some(embedding) => find_similar_faces(&deps.pool, embedding, deps.config.vector_top_k)
            .await
            .context("Vector retrieval failed")?,
        None => Vec::new(),
    };
    debug!(
        "[{}] Vector retrieval returned {} rows",
        request_id,
        vector_results.len()
    );

    let filter = TextFilter {
        first_name: Some(query.first_name.clone()),
        last_name: Some(query.last_name.clone()),
        email: query.email.clone(),
        mdm_id: query.mdm_id.clone(),
        birth_date: query.birth_date,
    };
    let text_results = find_similar_textual(&deps.pool, &filter, deps.config.text_top_k)
        .await
        .context("Textual retrieval failed")?;
    debug!(
        "[{}] Textual retrieval returned {} rows",
        request_id,
        text_results.len()
    );

    let mut candidates = merge_candidates(vector_results, text_results);
    if candidates.is_empty() {
        info!("[{}] No candidates found", request_id);
        return Ok(Vec::new());
    }

    rerank_with_text(&query, &mut candidates);

    let query_side = PairSide::from_query(&query);
    let query_embedding = query.embedding.clone();

    let inputs: Vec<_> = stream::iter(candidates)
        .map(|candidate| {
            let query_side = query_side.clone();
            let query_embedding = query_embedding.clone();
            let embedder = Arc::clone(&deps.embedder);
            let cache = Arc::clone(&deps.cache);
            async move {
                let pair = MatchPair {
                    a: query_side,
                    b: PairSide::from_person(&candidate.record),
                };
                let (features, mut flags) = extract_pair_features(
                    &pair,
                    query_embedding.as_deref(),
                    candidate.record.embedding.as_deref(),
                    embedder.as_ref(),
                    &cache,
                )
                .await;
                flags.nickname_degraded = nickname_degraded;
                (candidate, features, flags)
            }
        })
        .buffered(FEATURE_EXTRACTION_CONCURRENCY)
        .collect()
        .await;

    let scored = score_candidates(&deps.model, inputs).await;
    info!(
        "[{}] Scored {} candidates (model v{})",
        request_id,
        scored.len(),
        deps.model.version().await
    );
    Ok(scored)
}
