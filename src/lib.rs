// src/lib.rs

pub mod embedding;
pub mod matching;
pub mod models;
pub mod retrieval;
pub mod training;
pub mod utils;

pub use matching::manager::{run_search, PipelineDeps};
pub use matching::scoring::ModelHandle;
pub use utils::config::MatchingConfig;
