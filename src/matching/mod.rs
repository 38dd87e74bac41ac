// src/matching/mod.rs

pub mod features;
pub mod manager;
pub mod normalize;
pub mod rerank;
pub mod scoring;
