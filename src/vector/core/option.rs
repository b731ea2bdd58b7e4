//! Vector index configuration options.
//!
//! This module defines the index variants a library can be configured with
//! and the per-variant parameters used when an index is constructed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::vector::core::distance::DistanceMetric;

/// The type of vector index backing a library.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum IndexKind {
    /// Locality-sensitive hashing - approximate but sub-linear.
    #[default]
    #[serde(rename = "lsh")]
    Lsh,
    /// Exhaustive scan - exact but linear in the corpus size.
    #[serde(rename = "bruteforce")]
    BruteForce,
}

impl IndexKind {
    /// Approximate variants may miss neighbours and require a fallback.
    pub fn is_approximate(&self) -> bool {
        matches!(self, IndexKind::Lsh)
    }

    /// Persistent variants are written to storage after every mutation.
    /// Others live in the cache only and are rebuilt on demand.
    pub fn is_persistent(&self) -> bool {
        matches!(self, IndexKind::Lsh)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Lsh => "lsh",
            IndexKind::BruteForce => "bruteforce",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = QuarryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lsh" => Ok(IndexKind::Lsh),
            "bruteforce" | "brute_force" | "flat" => Ok(IndexKind::BruteForce),
            other => Err(QuarryError::UnknownIndexType(other.to_string())),
        }
    }
}

/// Options for the LSH index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LshOption {
    #[serde(default = "default_num_tables")]
    pub num_tables: usize,
    #[serde(default = "default_num_hashes")]
    pub num_hashes: usize,
    /// Seed for hyperplane generation. `None` draws from the OS RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_num_tables() -> usize {
    5
}

fn default_num_hashes() -> usize {
    10
}

impl Default for LshOption {
    fn default() -> Self {
        Self {
            num_tables: default_num_tables(),
            num_hashes: default_num_hashes(),
            seed: None,
        }
    }
}

impl LshOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_tables(mut self, n: usize) -> Self {
        self.num_tables = n;
        self
    }

    pub fn num_hashes(mut self, n: usize) -> Self {
        self.num_hashes = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Options for the brute-force index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BruteForceOption {
    #[serde(default)]
    pub metric: DistanceMetric,
}

impl BruteForceOption {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

/// Everything needed to construct any index variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    /// Embedding dimension shared by every index.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub lsh: LshOption,
    #[serde(default)]
    pub brute_force: BruteForceOption,
}

/// Dimension of the embeddings produced by the default provider model.
pub const DEFAULT_EMBEDDING_DIM: usize = 1024;

fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIM
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            lsh: LshOption::default(),
            brute_force: BruteForceOption::default(),
        }
    }
}

impl IndexConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn lsh(mut self, lsh: LshOption) -> Self {
        self.lsh = lsh;
        self
    }

    pub fn brute_force(mut self, brute_force: BruteForceOption) -> Self {
        self.brute_force = brute_force;
        self
    }

    /// Reject parameter combinations no index can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(QuarryError::invalid_config(
                "index dimension must be greater than zero",
            ));
        }
        if self.lsh.num_tables == 0 {
            return Err(QuarryError::invalid_config(
                "lsh num_tables must be greater than zero",
            ));
        }
        if self.lsh.num_hashes == 0 {
            return Err(QuarryError::invalid_config(
                "lsh num_hashes must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_kind_parse() {
        assert_eq!("lsh".parse::<IndexKind>().unwrap(), IndexKind::Lsh);
        assert_eq!(
            "BruteForce".parse::<IndexKind>().unwrap(),
            IndexKind::BruteForce
        );
        let err = "hnsw".parse::<IndexKind>().unwrap_err();
        assert!(matches!(err, QuarryError::UnknownIndexType(t) if t == "hnsw"));
    }

    #[test]
    fn test_index_kind_serde_names() {
        assert_eq!(serde_json::to_string(&IndexKind::Lsh).unwrap(), "\"lsh\"");
        assert_eq!(
            serde_json::to_string(&IndexKind::BruteForce).unwrap(),
            "\"bruteforce\""
        );
        let kind: IndexKind = serde_json::from_str("\"bruteforce\"").unwrap();
        assert_eq!(kind, IndexKind::BruteForce);
    }

    #[test]
    fn test_kind_capabilities() {
        assert!(IndexKind::Lsh.is_approximate());
        assert!(IndexKind::Lsh.is_persistent());
        assert!(!IndexKind::BruteForce.is_approximate());
        assert!(!IndexKind::BruteForce.is_persistent());
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: IndexConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.dimension, 1024);
        assert_eq!(config.lsh.num_tables, 5);
        assert_eq!(config.lsh.num_hashes, 10);
        assert_eq!(config.brute_force.metric, DistanceMetric::Euclidean);
    }

    #[test]
    fn test_validate() {
        assert!(IndexConfig::new(8).validate().is_ok());
        assert!(IndexConfig::new(0).validate().is_err());
        assert!(
            IndexConfig::new(8)
                .lsh(LshOption::new().num_hashes(0))
                .validate()
                .is_err()
        );
    }
}
