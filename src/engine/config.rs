use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::embedder::Embedder;
use crate::error::{QuarryError, Result};
use crate::vector::cache::CacheConfig;
use crate::vector::coordinator::DEFAULT_MAX_K;
use crate::vector::core::option::{DEFAULT_EMBEDDING_DIM, IndexConfig, IndexKind};

/// Configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Embedding dimension every chunk and query must have.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Index kind for libraries created without an explicit one.
    #[serde(default)]
    pub default_index_type: IndexKind,
    /// Upper bound on `k` in queries.
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    /// Per-variant index parameters. Its dimension is overridden by `dimension`.
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Text embedder. Without one, every chunk and query needs an embedding.
    #[serde(skip)]
    pub embedder: Option<Arc<dyn Embedder>>,
}

fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIM
}

fn default_max_k() -> usize {
    DEFAULT_MAX_K
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            default_index_type: IndexKind::default(),
            max_k: default_max_k(),
            index: IndexConfig::default(),
            cache: CacheConfig::default(),
            embedder: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parse a configuration document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| QuarryError::invalid_config(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Index parameters with the engine dimension applied.
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            dimension: self.dimension,
            ..self.index.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(QuarryError::invalid_config(
                "dimension must be greater than zero",
            ));
        }
        if self.max_k == 0 {
            return Err(QuarryError::invalid_config("max_k must be greater than zero"));
        }
        if let Some(dim) = self.embedder.as_ref().and_then(|e| e.dimension())
            && dim != self.dimension
        {
            return Err(QuarryError::invalid_config(format!(
                "embedder produces {dim}-dimensional vectors but the engine expects {}",
                self.dimension
            )));
        }
        self.index_config().validate()?;
        self.cache.validate()
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn dimension(mut self, dimension: usize) -> Self {
        self.config.dimension = dimension;
        self
    }

    pub fn default_index_type(mut self, kind: IndexKind) -> Self {
        self.config.default_index_type = kind;
        self
    }

    pub fn max_k(mut self, max_k: usize) -> Self {
        self.config.max_k = max_k;
        self
    }

    pub fn index(mut self, index: IndexConfig) -> Self {
        self.config.index = index;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.config.embedder = Some(embedder);
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
