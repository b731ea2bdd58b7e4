//! The embedding provider abstraction.

use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What the embedded text will be used for.
///
/// Asymmetric models embed stored passages and search queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedInputType {
    /// Text stored in the index (chunk contents).
    Document,
    /// Text used to search the index.
    Query,
}

/// Converts text into a fixed-dimension vector.
///
/// Failures of a remote provider are reported as
/// [`QuarryError::EmbeddingProvider`](crate::error::QuarryError::EmbeddingProvider)
/// and are never retried internally.
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    /// Embed a single text.
    async fn embed(&self, text: &str, input_type: EmbedInputType) -> Result<Vec<f32>>;

    /// Whether this embedder can embed text at all.
    fn supports_text(&self) -> bool {
        true
    }

    /// Output dimension, if known ahead of time.
    fn dimension(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str;

    /// Returns a type-erased reference for downcasting to concrete implementations.
    fn as_any(&self) -> &dyn Any;
}
