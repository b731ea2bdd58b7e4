//! The vector index capability and its implementations.
//!
//! # Module Structure
//!
//! - [`flat`] - exact brute-force index
//! - [`lsh`] - random-hyperplane locality-sensitive hashing index
//! - [`factory`] - construction from configuration
//! - [`serializer`] - durable representation of persistent indexes

pub mod factory;
pub mod flat;
pub mod lsh;
pub mod serializer;

use std::any::Any;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::vector::core::option::IndexKind;

/// A nearest-neighbour index keyed by chunk id.
pub trait VectorIndex: Send + Sync + Debug {
    /// The variant of this index.
    fn kind(&self) -> IndexKind;

    /// Dimension every stored and query vector must have.
    fn dimension(&self) -> usize;

    /// Insert a vector under `id`. An existing entry for `id` is replaced.
    fn add(&mut self, id: Uuid, vector: &[f32]) -> Result<()>;

    /// Remove the vector stored under `id`. Removing an absent id is a no-op.
    fn remove(&mut self, id: &Uuid);

    /// Return at most `k` hits ordered best-first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: &Uuid) -> bool;

    /// All ids currently stored, in no particular order.
    fn ids(&self) -> Vec<Uuid>;

    /// Returns a type-erased reference for downcasting to concrete implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Index handle shared between the cache and in-flight requests.
///
/// Searches take the read lock, mutations the write lock.
pub type SharedIndex = Arc<RwLock<Box<dyn VectorIndex>>>;

/// Wrap a freshly built index into a shareable handle.
pub fn share(index: Box<dyn VectorIndex>) -> SharedIndex {
    Arc::new(RwLock::new(index))
}

/// A single search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    /// Similarity in `[0, 1]`, higher is better.
    pub score: f32,
    /// Raw distance under the index metric, lower is better.
    pub distance: f32,
}

impl SearchHit {
    pub fn new(id: Uuid, score: f32, distance: f32) -> Self {
        Self {
            id,
            score,
            distance,
        }
    }

    /// Ordering that puts the better hit first. Exact ties fall back to the id.
    pub(crate) fn best_first(a: &SearchHit, b: &SearchHit) -> Ordering {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Reject vectors whose length differs from `expected`.
pub fn validate_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(QuarryError::dimension_mismatch(expected, vector.len()));
    }
    Ok(())
}

/// Reject vectors containing NaN or infinite components.
pub fn validate_finite(vector: &[f32]) -> Result<()> {
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(QuarryError::invalid_argument(format!(
            "vector contains a non-finite value at index {pos}"
        )));
    }
    Ok(())
}
