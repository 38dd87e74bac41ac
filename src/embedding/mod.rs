// src/embedding/mod.rs
//
// Client for the external image-embedding service plus a bounded,
// content-addressed cache of its results.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use log::info;
use lru::LruCache;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::EMBEDDING_DIM;

/// Maps image bytes to a fixed-length unit-normalized vector.
/// Deterministic for identical input; may fail on corrupt input.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, image_bytes: &[u8]) -> Result<Vec<f32>>;
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// HTTP client for the embedding service.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingClient {
    async fn embed(&self, image_bytes: &[u8]) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/octet-stream")
            .body(image_bytes.to_vec())
            .send()
            .await
            .context("Embedding service request failed")?
            .error_for_status()
            .context("Embedding service returned an error status")?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse embedding service response")?;

        if parsed.embedding.len() != EMBEDDING_DIM {
            return Err(anyhow::anyhow!(
                "Embedding service returned {} dimensions, expected {}",
                parsed.embedding.len(),
                EMBEDDING_DIM
            ));
        }
        Ok(parsed.embedding)
    }
}

/// Bounded LRU cache of embeddings keyed by image content hash.
/// Entries are immutable once written; concurrent recomputation on a
/// miss is harmless beyond the wasted call.
pub struct EmbeddingCache {
    cache: LruCache<String, Vec<f32>>,
    hits: usize,
    misses: usize,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        info!("Initializing embedding cache with capacity {}", capacity);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &str) -> Option<Vec<f32>> {
        match self.cache.get(key) {
            Some(v) => {
                self.hits += 1;
                if self.hits % 100 == 0 {
                    info!(
                        "Embedding cache stats - hits: {}, misses: {}, hit rate: {:.2}%",
                        self.hits,
                        self.misses,
                        (self.hits as f64 / (self.hits + self.misses) as f64) * 100.0
                    );
                }
                Some(v.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, key: String, value: Vec<f32>) {
        self.cache.put(key, value);
    }

    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

pub type SharedEmbeddingCache = Arc<Mutex<EmbeddingCache>>;

pub fn create_shared_embedding_cache(capacity: usize) -> SharedEmbeddingCache {
    Arc::new(Mutex::new(EmbeddingCache::new(capacity)))
}

fn content_key(image_bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(image_bytes))
}

/// Embeds raw image bytes through the cache. The lock is not held
/// across the service call.
pub async fn embed_image_cached(
    image_bytes: &[u8],
    embedder: &dyn EmbeddingService,
    cache: &SharedEmbeddingCache,
) -> Result<Vec<f32>> {
    let key = content_key(image_bytes);

    if let Some(cached) = cache.lock().await.get(&key) {
        return Ok(cached);
    }

    let embedding = embedder
        .embed(image_bytes)
        .await
        .context("Embedding computation failed")?;

    cache.lock().await.put(key, embedding.clone());
    Ok(embedding)
}

/// Embeds a base64-encoded image payload through the cache.
pub async fn embed_b64_cached(
    image_b64: &str,
    embedder: &dyn EmbeddingService,
    cache: &SharedEmbeddingCache,
) -> Result<Vec<f32>> {
    let bytes = B64
        .decode(image_b64)
        .context("Failed to decode base64 image payload")?;
    embed_image_cached(&bytes, embedder, cache).await
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder: same bytes always produce the same
    /// unit vector, distinct leading bytes produce orthogonal ones.
    pub struct StubEmbedder {
        pub calls: AtomicUsize,
    }

    impl StubEmbedder {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingService for StubEmbedder {
        async fn embed(&self, image_bytes: &[u8]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if image_bytes.is_empty() {
                return Err(anyhow::anyhow!("empty image"));
            }
            let mut v = vec![0.0f32; EMBEDDING_DIM];
            v[(image_bytes[0] as usize) % EMBEDDING_DIM] = 1.0;
            Ok(v)
        }
    }

    /// Always fails; used to exercise degraded paths.
    pub struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingService for FailingEmbedder {
        async fn embed(&self, _image_bytes: &[u8]) -> Result<Vec<f32>> {
            Err(anyhow::anyhow!("embedding service unreachable"))
        }
    }
}
