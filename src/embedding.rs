//! Text embedding providers.
//!
//! # Module Structure
//!
//! - [`embedder`] - the [`Embedder`](embedder::Embedder) trait
//! - [`precomputed`] - provider for callers that always supply embeddings
//! - [`executor`] - drives async providers from synchronous code
//! - `cohere` - Cohere HTTP provider (feature `embeddings-cohere`)

pub mod embedder;
pub mod executor;
pub mod precomputed;

#[cfg(feature = "embeddings-cohere")]
pub mod cohere;
