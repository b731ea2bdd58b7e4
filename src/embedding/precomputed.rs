//! Embedder for deployments where every embedding is supplied by the caller.

use std::any::Any;

use async_trait::async_trait;

use crate::embedding::embedder::{EmbedInputType, Embedder};
use crate::error::{QuarryError, Result};

/// Rejects all text. Chunks and queries must carry their own embedding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedEmbedder;

impl PrecomputedEmbedder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Embedder for PrecomputedEmbedder {
    async fn embed(&self, _text: &str, _input_type: EmbedInputType) -> Result<Vec<f32>> {
        Err(QuarryError::invalid_argument(
            "no embedding provider configured; an embedding must be supplied",
        ))
    }

    fn supports_text(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "precomputed"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
