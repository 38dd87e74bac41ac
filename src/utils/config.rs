// src/utils/config.rs

use log::info;
use std::env;

const DEFAULT_VECTOR_TOP_K: i64 = 10;
const DEFAULT_TEXT_TOP_K: i64 = 50;
const DEFAULT_MIN_FEEDBACK: usize = 10;
const DEFAULT_EMBEDDING_CACHE_SIZE: usize = 10_000;
const DEFAULT_MODEL_PATH: &str = "dedup_model.json";
const DEFAULT_EMBEDDING_ENDPOINT: &str = "http://127.0.0.1:8000/embed";

/// Pipeline configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Candidates returned by the vector nearest-neighbor path.
    pub vector_top_k: i64,
    /// Candidates returned by the textual blocking path.
    pub text_top_k: i64,
    /// Minimum labeled feedback rows before a retrain will run.
    pub min_feedback: usize,
    /// Optional match-class F1 floor a retrained model must clear
    /// before it replaces the deployed artifact. Unset means no gate.
    pub min_promote_f1: Option<f64>,
    /// Bounded size of the content-addressed embedding cache.
    pub embedding_cache_size: usize,
    /// Path of the deployed classifier artifact.
    pub model_path: String,
    /// Embedding service endpoint.
    pub embedding_endpoint: String,
}

impl MatchingConfig {
    pub fn from_env() -> Self {
        let vector_top_k = env_parse("MATCH_VECTOR_TOP_K", DEFAULT_VECTOR_TOP_K);
        let text_top_k = env_parse("MATCH_TEXT_TOP_K", DEFAULT_TEXT_TOP_K);
        let min_feedback = env_parse("MATCH_MIN_FEEDBACK", DEFAULT_MIN_FEEDBACK);
        let min_promote_f1 = env::var("MATCH_MIN_PROMOTE_F1")
            .ok()
            .and_then(|s| s.parse::<f64>().ok());
        let embedding_cache_size =
            env_parse("MATCH_EMBEDDING_CACHE_SIZE", DEFAULT_EMBEDDING_CACHE_SIZE).max(1);
        let model_path =
            env::var("MATCH_MODEL_PATH").unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string());
        let embedding_endpoint = env::var("EMBEDDING_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_ENDPOINT.to_string());

        Self {
            vector_top_k,
            text_top_k,
            min_feedback,
            min_promote_f1,
            embedding_cache_size,
            model_path,
            embedding_endpoint,
        }
    }

    pub fn log_config(&self) {
        info!(
            "Matching config: vector_top_k={}, text_top_k={}, min_feedback={}, promote_f1_gate={}, embedding_cache_size={}, model_path={}",
            self.vector_top_k,
            self.text_top_k,
            self.min_feedback,
            self.min_promote_f1
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "off".to_string()),
            self.embedding_cache_size,
            self.model_path,
        );
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            vector_top_k: DEFAULT_VECTOR_TOP_K,
            text_top_k: DEFAULT_TEXT_TOP_K,
            min_feedback: DEFAULT_MIN_FEEDBACK,
            min_promote_f1: None,
            embedding_cache_size: DEFAULT_EMBEDDING_CACHE_SIZE,
            model_path: DEFAULT_MODEL_PATH.to_string(),
            embedding_endpoint: DEFAULT_EMBEDDING_ENDPOINT.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}
