//! Random-hyperplane locality-sensitive hashing index.
//!
//! Each of the `num_tables` tables owns a `num_hashes × dim` matrix of Gaussian
//! hyperplanes. A vector's signature in a table is the string of sign bits of
//! its dot products with the table's hyperplanes, so vectors separated by a
//! small angle collide with high probability. A query only scores the ids that
//! share a bucket with it in at least one table.
//!
//! Recall is not guaranteed: a query whose bucket is empty in every table
//! returns no hits, and callers are expected to fall back to exact search.

use std::any::Any;
use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::vector::core::distance::{dot, normalized};
use crate::vector::core::option::{IndexKind, LshOption};
use crate::vector::index::{SearchHit, VectorIndex, validate_dimension};

/// Candidate count above which scoring runs on the rayon pool.
const PARALLEL_SCORE_THRESHOLD: usize = 2048;

/// Approximate nearest-neighbour index based on sign random projections.
#[derive(Debug, Clone)]
pub struct LshIndex {
    dim: usize,
    num_tables: usize,
    num_hashes: usize,
    /// `num_tables` matrices of `num_hashes` rows, each of length `dim`.
    hyperplanes: Vec<Vec<Vec<f32>>>,
    /// Per table: signature -> ids in that bucket.
    tables: Vec<AHashMap<String, Vec<Uuid>>>,
    /// Unit-normalized vectors by id.
    vectors: AHashMap<Uuid, Vec<f32>>,
}

impl LshIndex {
    /// Create an empty index with freshly drawn hyperplanes.
    pub fn new(dim: usize, option: &LshOption) -> Result<Self> {
        if dim == 0 || option.num_tables == 0 || option.num_hashes == 0 {
            return Err(QuarryError::invalid_config(format!(
                "lsh index requires non-zero dimension, tables and hashes \
                 (dim={dim}, num_tables={}, num_hashes={})",
                option.num_tables, option.num_hashes
            )));
        }

        let mut rng = match option.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let hyperplanes = (0..option.num_tables)
            .map(|_| {
                (0..option.num_hashes)
                    .map(|_| (0..dim).map(|_| gaussian(&mut rng)).collect())
                    .collect()
            })
            .collect();

        Ok(Self {
            dim,
            num_tables: option.num_tables,
            num_hashes: option.num_hashes,
            hyperplanes,
            tables: vec![AHashMap::new(); option.num_tables],
            vectors: AHashMap::new(),
        })
    }

    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    /// Number of non-empty buckets per table.
    pub fn bucket_counts(&self) -> Vec<usize> {
        self.tables.iter().map(|t| t.len()).collect()
    }

    /// Signatures of a stored vector in every table.
    pub fn signatures(&self, id: &Uuid) -> Option<Vec<String>> {
        let vector = self.vectors.get(id)?;
        Some(
            (0..self.num_tables)
                .map(|table| self.signature(table, vector))
                .collect(),
        )
    }

    fn signature(&self, table: usize, vector: &[f32]) -> String {
        self.hyperplanes[table]
            .iter()
            .map(|plane| if dot(vector, plane) > 0.0 { '1' } else { '0' })
            .collect()
    }

    fn candidates(&self, query: &[f32]) -> AHashSet<Uuid> {
        let mut candidates = AHashSet::new();
        for (table_no, table) in self.tables.iter().enumerate() {
            if let Some(bucket) = table.get(&self.signature(table_no, query)) {
                candidates.extend(bucket.iter().copied());
            }
        }
        candidates
    }

    fn score(&self, query: &[f32], id: Uuid) -> Option<(Uuid, f32)> {
        self.vectors.get(&id).map(|v| (id, dot(query, v)))
    }

    fn remove_from_tables(&mut self, id: &Uuid, vector: &[f32]) {
        for table_no in 0..self.num_tables {
            let key = self.signature(table_no, vector);
            let table = &mut self.tables[table_no];
            let found = match table.get_mut(&key) {
                Some(bucket) => {
                    let before = bucket.len();
                    bucket.retain(|member| member != id);
                    before != bucket.len()
                }
                None => false,
            };
            if found {
                if table.get(&key).is_some_and(|b| b.is_empty()) {
                    table.remove(&key);
                }
            } else {
                // The bucket did not hold the id; fall back to a full scan.
                table.retain(|_, bucket| {
                    bucket.retain(|member| member != id);
                    !bucket.is_empty()
                });
            }
        }
    }

    /// Capture the full durable state of the index.
    pub fn to_state(&self) -> LshIndexState {
        LshIndexState {
            dim: self.dim,
            num_tables: self.num_tables,
            num_hashes: self.num_hashes,
            tables: self
                .tables
                .iter()
                .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .collect(),
            hyperplanes: self.hyperplanes.clone(),
            vectors: self
                .vectors
                .iter()
                .map(|(id, v)| (*id, v.clone()))
                .collect(),
        }
    }

    /// Rebuild an index from persisted state, verifying its shape.
    ///
    /// Hyperplanes are taken verbatim; bucket membership is only valid for the
    /// exact hyperplanes it was computed with.
    pub fn from_state(state: LshIndexState) -> Result<Self> {
        state.validate()?;
        Ok(Self {
            dim: state.dim,
            num_tables: state.num_tables,
            num_hashes: state.num_hashes,
            hyperplanes: state.hyperplanes,
            tables: state
                .tables
                .into_iter()
                .map(|t| t.into_iter().collect())
                .collect(),
            vectors: state.vectors.into_iter().collect(),
        })
    }
}

impl VectorIndex for LshIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Lsh
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn add(&mut self, id: Uuid, vector: &[f32]) -> Result<()> {
        validate_dimension(self.dim, vector)?;
        self.remove(&id);

        let unit = normalized(vector);
        for table_no in 0..self.num_tables {
            let key = self.signature(table_no, &unit);
            self.tables[table_no].entry(key).or_default().push(id);
        }
        self.vectors.insert(id, unit);
        Ok(())
    }

    fn remove(&mut self, id: &Uuid) {
        if let Some(vector) = self.vectors.remove(id) {
            self.remove_from_tables(id, &vector);
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        validate_dimension(self.dim, query)?;
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let unit = normalized(query);
        let candidates = self.candidates(&unit);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<Uuid> = candidates.into_iter().collect();
        let scored: Vec<(Uuid, f32)> = if candidates.len() >= PARALLEL_SCORE_THRESHOLD {
            candidates
                .par_iter()
                .filter_map(|&id| self.score(&unit, id))
                .collect()
        } else {
            candidates
                .iter()
                .filter_map(|&id| self.score(&unit, id))
                .collect()
        };
        let mut hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(id, similarity)| {
                SearchHit::new(id, similarity.clamp(0.0, 1.0), 1.0 - similarity)
            })
            .collect();
        hits.sort_by(SearchHit::best_first);
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.vectors.contains_key(id)
    }

    fn ids(&self) -> Vec<Uuid> {
        self.vectors.keys().copied().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Durable representation of an [`LshIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshIndexState {
    pub dim: usize,
    pub num_tables: usize,
    pub num_hashes: usize,
    /// Per table: signature -> ids.
    pub tables: Vec<BTreeMap<String, Vec<Uuid>>>,
    /// Per table: `num_hashes × dim` hyperplane matrix.
    pub hyperplanes: Vec<Vec<Vec<f32>>>,
    /// Unit-normalized vectors by id.
    pub vectors: BTreeMap<Uuid, Vec<f32>>,
}

impl LshIndexState {
    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(QuarryError::index(format!("invalid lsh state: {msg}")));

        if self.dim == 0 || self.num_tables == 0 || self.num_hashes == 0 {
            return invalid("zero dimension, table or hash count".to_string());
        }
        if self.tables.len() != self.num_tables || self.hyperplanes.len() != self.num_tables {
            return invalid(format!(
                "expected {} tables, found {} bucket maps and {} hyperplane matrices",
                self.num_tables,
                self.tables.len(),
                self.hyperplanes.len()
            ));
        }
        for (table_no, matrix) in self.hyperplanes.iter().enumerate() {
            if matrix.len() != self.num_hashes || matrix.iter().any(|row| row.len() != self.dim) {
                return invalid(format!(
                    "hyperplane matrix {table_no} is not {}x{}",
                    self.num_hashes, self.dim
                ));
            }
        }
        if let Some((id, v)) = self.vectors.iter().find(|(_, v)| v.len() != self.dim) {
            return invalid(format!(
                "vector {id} has dimension {}, expected {}",
                v.len(),
                self.dim
            ));
        }
        for (table_no, table) in self.tables.iter().enumerate() {
            for (signature, ids) in table {
                if signature.len() != self.num_hashes
                    || !signature.chars().all(|c| c == '0' || c == '1')
                {
                    return invalid(format!(
                        "table {table_no} has malformed signature '{signature}'"
                    ));
                }
                if let Some(id) = ids.iter().find(|id| !self.vectors.contains_key(id)) {
                    return invalid(format!(
                        "table {table_no} references unknown id {id}"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Standard normal sample via the Box-Muller transform.
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}
