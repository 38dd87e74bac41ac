// src/utils/candle.rs

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use once_cell::sync::Lazy;

static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| Device::Cpu);

/// Cosine similarity between two embedding vectors, computed on the
/// process-wide Candle device. NaN/Inf results collapse to 0.0 so the
/// caller never sees an out-of-range value.
pub fn cosine_similarity_candle(v1_slice: &[f32], v2_slice: &[f32]) -> Result<f64> {
    if v1_slice.len() != v2_slice.len() {
        return Err(anyhow::anyhow!(
            "Input vector lengths differ: {} vs {}",
            v1_slice.len(),
            v2_slice.len()
        ));
    }
    if v1_slice.is_empty() {
        return Err(anyhow::anyhow!("Input vectors must not be empty"));
    }

    let v1 = Tensor::from_slice(v1_slice, (v1_slice.len(),), &CANDLE_DEVICE)
        .context("Failed to create tensor v1")?;
    let v2 = Tensor::from_slice(v2_slice, (v2_slice.len(),), &CANDLE_DEVICE)
        .context("Failed to create tensor v2")?;

    let dot = ((&v1 * &v2).context("Dot product multiply failed")?)
        .sum_all()
        .context("Dot product sum failed")?
        .to_scalar::<f32>()
        .context("Dot product to scalar failed")? as f64;

    let mag1 = ((&v1 * &v1).context("v1 magnitude multiply failed")?)
        .sum_all()
        .context("v1 magnitude sum failed")?
        .to_scalar::<f32>()
        .context("v1 magnitude to scalar failed")?
        .sqrt() as f64;

    let mag2 = ((&v2 * &v2).context("v2 magnitude multiply failed")?)
        .sum_all()
        .context("v2 magnitude sum failed")?
        .to_scalar::<f32>()
        .context("v2 magnitude to scalar failed")?
        .sqrt() as f64;

    if mag1 == 0.0 || mag2 == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot / (mag1 * mag2);
    if similarity.is_nan() || similarity.is_infinite() {
        log::warn!(
            "Cosine similarity is NaN/Inf (dot={}, mag1={}, mag2={}); returning 0.0",
            dot,
            mag1,
            mag2
        );
        return Ok(0.0);
    }

    Ok(similarity)
}
