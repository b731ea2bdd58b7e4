//! Brute-force (flat) vector index.
//!
//! Every search scans all stored vectors, so results are exact. Cost is
//! O(n log k) per query; the index is meant for small libraries and as the
//! exact fallback behind approximate indexes.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use rayon::prelude::*;
use uuid::Uuid;

use crate::error::Result;
use crate::vector::core::distance::DistanceMetric;
use crate::vector::core::option::IndexKind;
use crate::vector::index::{SearchHit, VectorIndex, validate_dimension};

/// Corpus size above which distances are computed on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Exact nearest-neighbour index.
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    dimension: usize,
    metric: DistanceMetric,
    entries: Vec<(Uuid, Vec<f32>)>,
    positions: AHashMap<Uuid, usize>,
}

impl BruteForceIndex {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            entries: Vec::new(),
            positions: AHashMap::new(),
        }
    }

    /// Distance metric used for ranking.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Stored vector for `id`, if any.
    pub fn get(&self, id: &Uuid) -> Option<&[f32]> {
        self.positions
            .get(id)
            .map(|&pos| self.entries[pos].1.as_slice())
    }

    fn distances(&self, query: &[f32]) -> Vec<(usize, f32)> {
        let metric = self.metric;
        if self.entries.len() >= PARALLEL_SCAN_THRESHOLD {
            self.entries
                .par_iter()
                .enumerate()
                .map(|(pos, (_, vector))| (pos, metric.distance(query, vector)))
                .collect()
        } else {
            self.entries
                .iter()
                .enumerate()
                .map(|(pos, (_, vector))| (pos, metric.distance(query, vector)))
                .collect()
        }
    }
}

impl VectorIndex for BruteForceIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::BruteForce
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add(&mut self, id: Uuid, vector: &[f32]) -> Result<()> {
        validate_dimension(self.dimension, vector)?;
        match self.positions.get(&id) {
            Some(&pos) => self.entries[pos].1 = vector.to_vec(),
            None => {
                self.positions.insert(id, self.entries.len());
                self.entries.push((id, vector.to_vec()));
            }
        }
        Ok(())
    }

    fn remove(&mut self, id: &Uuid) {
        let Some(pos) = self.positions.remove(id) else {
            return;
        };
        self.entries.swap_remove(pos);
        if let Some((moved, _)) = self.entries.get(pos) {
            self.positions.insert(*moved, pos);
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        validate_dimension(self.dimension, query)?;
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        // Max-heap on distance: the root is the worst of the current top k.
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        for (pos, distance) in self.distances(query) {
            if heap.len() < k {
                heap.push(Candidate { distance, pos });
            } else if let Some(worst) = heap.peek()
                && distance < worst.distance
            {
                heap.pop();
                heap.push(Candidate { distance, pos });
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| {
                SearchHit::new(
                    self.entries[c.pos].0,
                    self.metric.score(c.distance),
                    c.distance,
                )
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.positions.contains_key(id)
    }

    fn ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    pos: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.pos.cmp(&other.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarryError;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<(Uuid, Vec<f32>)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let v = (0..dim).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect();
                (Uuid::new_v4(), v)
            })
            .collect()
    }

    fn reference_top_k(
        corpus: &[(Uuid, Vec<f32>)],
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
    ) -> Vec<Uuid> {
        let mut all: Vec<(Uuid, f32)> = corpus
            .iter()
            .map(|(id, v)| (*id, metric.distance(query, v)))
            .collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1));
        all.into_iter().take(k).map(|(id, _)| id).collect()
    }

    #[test]
    fn test_matches_exhaustive_reference() {
        for metric in [DistanceMetric::Euclidean, DistanceMetric::Cosine] {
            let corpus = random_vectors(500, 16, 7);
            let mut index = BruteForceIndex::new(16, metric);
            for (id, v) in &corpus {
                index.add(*id, v).unwrap();
            }

            for (qi, (_, query)) in random_vectors(20, 16, 99).iter().enumerate() {
                let k = 1 + qi % 10;
                let hits = index.search(query, k).unwrap();
                let got: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
                assert_eq!(got, reference_top_k(&corpus, query, k, metric));
                assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
            }
        }
    }

    #[test]
    fn test_two_clusters() {
        let mut index = BruteForceIndex::new(2, DistanceMetric::Euclidean);
        let c1 = [Uuid::new_v4(), Uuid::new_v4()];
        let c2 = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        index.add(c1[0], &[1.0, 1.0]).unwrap();
        index.add(c1[1], &[1.1, 0.9]).unwrap();
        index.add(c2[0], &[-5.0, -5.0]).unwrap();
        index.add(c2[1], &[-5.1, -4.9]).unwrap();
        index.add(c2[2], &[-4.9, -5.2]).unwrap();

        let hits = index.search(&[1.02, 0.98], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, c1[0]);
        assert_eq!(hits[1].id, c1[1]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_remove_hides_vector() {
        let mut index = BruteForceIndex::new(2, DistanceMetric::Euclidean);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        index.add(a, &[0.0, 0.0]).unwrap();
        index.add(b, &[1.0, 0.0]).unwrap();
        index.add(c, &[2.0, 0.0]).unwrap();

        index.remove(&a);
        index.remove(&a);
        assert_eq!(index.len(), 2);
        assert!(!index.contains(&a));

        let hits = index.search(&[0.0, 0.0], 10).unwrap();
        assert!(hits.iter().all(|h| h.id != a));
        assert_eq!(hits[0].id, b);
        assert_eq!(index.get(&c), Some(&[2.0, 0.0][..]));
    }

    #[test]
    fn test_duplicate_add_is_last_wins() {
        let mut index = BruteForceIndex::new(2, DistanceMetric::Euclidean);
        let id = Uuid::new_v4();
        index.add(id, &[0.0, 0.0]).unwrap();
        index.add(id, &[3.0, 4.0]).unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&[0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_untouched() {
        let mut index = BruteForceIndex::new(3, DistanceMetric::Euclidean);
        let err = index.add(Uuid::new_v4(), &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, QuarryError::DimensionMismatch { .. }));
        assert!(index.is_empty());
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let mut index = BruteForceIndex::new(2, DistanceMetric::Cosine);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
        index.add(Uuid::new_v4(), &[1.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_cosine_zero_query_distance_is_one() {
        let mut index = BruteForceIndex::new(2, DistanceMetric::Cosine);
        index.add(Uuid::new_v4(), &[1.0, 0.0]).unwrap();
        let hits = index.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(hits[0].score, 0.0);
    }
}
