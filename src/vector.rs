//! Vector indexing for libraries.
//!
//! This module provides nearest-neighbour search over chunk embeddings through
//! pluggable index structures (LSH, brute force), together with the caching,
//! persistence and coordination that keep each library's index consistent with
//! its chunks.
//!
//! # Module Structure
//!
//! - `core`: distance math and index options
//! - `index`: the `VectorIndex` trait, implementations, factory and serializer
//! - `cache`: bounded LRU caches for indexes and chunks
//! - `repository`: cache-backed loading and saving of indexes
//! - `coordinator`: per-library consistency protocol

pub mod cache;
pub mod coordinator;
pub mod core;
pub mod index;
pub mod repository;

// Re-exports
pub use cache::{CacheConfig, CacheStats, IndexCache};
pub use coordinator::IndexCoordinator;
pub use core::distance::DistanceMetric;
pub use core::option::{BruteForceOption, IndexConfig, IndexKind, LshOption};
pub use index::factory::IndexFactory;
pub use index::flat::BruteForceIndex;
pub use index::lsh::{LshIndex, LshIndexState};
pub use index::serializer::IndexSerializer;
pub use index::{SearchHit, SharedIndex, VectorIndex};
pub use repository::IndexRepository;
