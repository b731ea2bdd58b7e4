//! Distance metrics and vector math.
//!
//! Distances follow the "lower is closer" convention. Every metric also maps a
//! distance onto a similarity score in `[0, 1]` (higher is closer) so that
//! results from different index variants can be reported uniformly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QuarryError;

/// Distance metric used by exact search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 norm of the difference vector.
    #[default]
    Euclidean,
    /// `1 - cosine_similarity`, or `1.0` when either vector is zero.
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }

    /// Convert a distance produced by this metric into a score in `[0, 1]`.
    #[inline]
    pub fn score(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Euclidean => 1.0 / (1.0 + distance.max(0.0)),
            DistanceMetric::Cosine => (1.0 - distance).clamp(0.0, 1.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(QuarryError::UnsupportedMetric(other.to_string())),
        }
    }
}

/// Dot product of two vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean (L2) norm of a vector.
#[inline]
pub fn euclidean_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Euclidean distance between two vectors.
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Cosine similarity in `[-1, 1]`. Zero vectors have similarity `0.0`.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = euclidean_norm(a);
    let norm_b = euclidean_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Cosine distance; `1.0` if either vector is the zero vector.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if is_zero(a) || is_zero(b) {
        return 1.0;
    }
    1.0 - cosine_similarity(a, b)
}

/// Whether every component is exactly zero.
#[inline]
pub fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Return a unit-L2-norm copy of `v`. The zero vector is returned unchanged.
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = euclidean_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}
