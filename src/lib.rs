//! # Quarry
//!
//! A vector similarity search backend. Embeddings are organised into
//! libraries, documents and chunks, and every library can be queried for the
//! chunks nearest to an embedding or a piece of text.
//!
//! ## Features
//!
//! - Pluggable nearest-neighbour indexes (random-hyperplane LSH, brute force)
//! - Exact fallback when an approximate index finds no candidates
//! - Bounded LRU caches for live indexes and chunk records
//! - Checksummed on-disk index format and JSON metadata snapshots
//! - Pluggable storage backends
//! - Optional Cohere embedding provider

pub mod data;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod storage;
pub mod store;
pub mod vector;

// Re-exports for the public API
pub use data::{
    Chunk, ChunkCreate, ChunkUpdate, Document, DocumentCreate, DocumentUpdate, Library,
    LibraryCreate, LibraryUpdate,
};
#[cfg(feature = "embeddings-cohere")]
pub use embedding::cohere::CohereEmbedder;
pub use embedding::embedder::{EmbedInputType, Embedder};
pub use embedding::executor::EmbedderExecutor;
pub use embedding::precomputed::PrecomputedEmbedder;
pub use engine::Engine;
pub use engine::config::{EngineConfig, EngineConfigBuilder};
pub use engine::query::{MetadataFilter, QueryRequest, QueryResult};
pub use error::{QuarryError, Result};
pub use storage::{Storage, StorageConfig, StorageFactory};
pub use store::{InMemoryMetadataStore, MetadataStore};
pub use vector::{
    BruteForceIndex, CacheConfig, CacheStats, DistanceMetric, IndexConfig, IndexKind, LshIndex,
    LshOption, SearchHit, VectorIndex,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
