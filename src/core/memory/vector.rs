// Vector operations: cosine similarity, blob codec, ranking order.

use super::memory_types::Memory;
use crate::error::{MemoryError, MemoryResult};
use std::cmp::Ordering;

/// Cosine similarity between two vectors, in [-1, 1].
///
/// Mismatched lengths, empty input and zero-norm vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f64::EPSILON {
        return 0.0;
    }

    let raw = dot / denom;
    if !raw.is_finite() {
        return 0.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let sim = raw.clamp(-1.0, 1.0) as f32;
    sim
}

/// Serialize f32 vector to bytes (little-endian)
pub fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for &f in v {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

/// Deserialize bytes to f32 vector (little-endian)
pub fn bytes_to_vec(bytes: &[u8]) -> MemoryResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(MemoryError::Serialization(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Search result order: score desc, then `updated_at` desc, then id desc.
pub fn rank_order(a: &Memory, b: &Memory) -> Ordering {
    let sa = a.score.unwrap_or(f32::NEG_INFINITY);
    let sb = b.score.unwrap_or(f32::NEG_INFINITY);
    sb.partial_cmp(&sa)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.id.cmp(&a.id))
}

/// Listing order: `created_at` desc, then id desc.
pub fn recency_order(a: &Memory, b: &Memory) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Blend similarity with decayed strength; `weight` 0.0 keeps pure similarity.
pub fn blended_score(similarity: f32, strength: f64, weight: f64) -> f64 {
    let weight = weight.clamp(0.0, 1.0);
    (1.0 - weight) * f64::from(similarity) + weight * strength
}
