//! Distance metrics for dense vector comparison.
//!
//! All metrics return a distance where **lower is better**; the public
//! search surface converts to a similarity score (higher is better) at
//! the boundary via [`DistanceMetric::score`]. The metric is fixed at
//! index creation and never mixed within one index.

use serde::{Deserialize, Serialize};

/// Distance metric used for dense similarity computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
    Cosine,
    /// Squared Euclidean distance (L2²). Range: \[0, ∞).
    Euclidean,
    /// Negative dot product: `-dot(a, b)`. Lower = higher similarity.
    DotProduct,
}

impl DistanceMetric {
    /// Computes the distance between two equal-length vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::Euclidean => euclidean_sq(a, b),
            Self::DotProduct => -dot(a, b),
        }
    }

    /// Converts an internal distance into the similarity score exposed to
    /// callers. Identical vectors yield the maximal score for the metric
    /// (1.0 for cosine, 0.0 for euclidean, their squared norm for dot).
    #[inline]
    pub fn score(&self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::Euclidean | Self::DotProduct => -distance,
        }
    }

    /// Returns the snake_case metric name used in logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dot_product",
        }
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        // A zero vector has no direction; treat it as orthogonal.
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
