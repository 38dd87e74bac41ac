// src/training/mod.rs

pub mod classifier;
pub mod feedback;
pub mod pair_generator;
pub mod trainer;
