//! Bounded LRU caches for live indexes and chunk records.
//!
//! Both caches are write-through: the authoritative copy of a chunk is the
//! metadata store, and the authoritative copy of a persistent index is its
//! serialized file. Eviction simply drops the entry.

use std::num::NonZeroUsize;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::Chunk;
use crate::error::{QuarryError, Result};
use crate::vector::index::SharedIndex;

/// Capacities of the two caches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default = "default_index_capacity")]
    pub index_capacity: usize,
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,
}

fn default_index_capacity() -> usize {
    10
}

fn default_chunk_capacity() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_capacity: default_index_capacity(),
            chunk_capacity: default_chunk_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn index_capacity(mut self, capacity: usize) -> Self {
        self.index_capacity = capacity;
        self
    }

    pub fn chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_capacity == 0 || self.chunk_capacity == 0 {
            return Err(QuarryError::invalid_config(format!(
                "cache capacities must be greater than zero (index={}, chunk={})",
                self.index_capacity, self.chunk_capacity
            )));
        }
        Ok(())
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Current number of entries.
    pub size: usize,
}

impl CacheStats {
    /// Returns the hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// One LRU cache plus its counters.
struct Lru<V> {
    name: &'static str,
    entries: LruCache<Uuid, V>,
    stats: CacheStats,
}

impl<V: Clone> Lru<V> {
    fn new(name: &'static str, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            QuarryError::invalid_config(format!("{name} cache capacity must be greater than zero"))
        })?;
        Ok(Self {
            name,
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        })
    }

    fn get(&mut self, id: &Uuid) -> Option<V> {
        match self.entries.get(id) {
            Some(value) => {
                self.stats.hits += 1;
                Some(value.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, id: Uuid, value: V) {
        if let Some((evicted, _)) = self.entries.push(id, value)
            && evicted != id
        {
            self.stats.evictions += 1;
            debug!("{} cache evicted {evicted}", self.name);
        }
        self.stats.size = self.entries.len();
    }

    fn remove(&mut self, id: &Uuid) -> Option<V> {
        let removed = self.entries.pop(id);
        self.stats.size = self.entries.len();
        removed
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.stats.size = 0;
    }
}

/// Library-id → index and chunk-id → chunk caches.
pub struct IndexCache {
    indexes: Mutex<Lru<SharedIndex>>,
    chunks: Mutex<Lru<Chunk>>,
}

impl IndexCache {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Ok(Self {
            indexes: Mutex::new(Lru::new("index", config.index_capacity)?),
            chunks: Mutex::new(Lru::new("chunk", config.chunk_capacity)?),
        })
    }

    pub fn get_index(&self, library_id: &Uuid) -> Option<SharedIndex> {
        self.indexes.lock().get(library_id)
    }

    pub fn put_index(&self, library_id: Uuid, index: SharedIndex) {
        self.indexes.lock().put(library_id, index);
    }

    pub fn remove_index(&self, library_id: &Uuid) -> Option<SharedIndex> {
        self.indexes.lock().remove(library_id)
    }

    pub fn get_chunk(&self, chunk_id: &Uuid) -> Option<Chunk> {
        self.chunks.lock().get(chunk_id)
    }

    pub fn put_chunk(&self, chunk: Chunk) {
        self.chunks.lock().put(chunk.id, chunk);
    }

    pub fn remove_chunk(&self, chunk_id: &Uuid) -> Option<Chunk> {
        self.chunks.lock().remove(chunk_id)
    }

    /// Return the cached chunk, or load it and cache the result.
    ///
    /// `load` runs under the chunk cache lock, so a fill cannot land after a
    /// writer's [`refresh_chunk`](Self::refresh_chunk) for a newer record.
    pub fn get_or_load_chunk<F>(&self, chunk_id: &Uuid, load: F) -> Result<Option<Chunk>>
    where
        F: FnOnce() -> Result<Option<Chunk>>,
    {
        let mut chunks = self.chunks.lock();
        if let Some(chunk) = chunks.get(chunk_id) {
            return Ok(Some(chunk));
        }
        let chunk = load()?;
        if let Some(chunk) = &chunk {
            chunks.put(chunk.id, chunk.clone());
        }
        Ok(chunk)
    }

    /// Replace the cached entry with the record `load` returns, dropping it
    /// when the record no longer exists.
    ///
    /// Writers call this after committing to the store. Refreshes are
    /// serialized, so the last one always reflects the latest commit.
    pub fn refresh_chunk<F>(&self, chunk_id: &Uuid, load: F) -> Result<Option<Chunk>>
    where
        F: FnOnce() -> Result<Option<Chunk>>,
    {
        let mut chunks = self.chunks.lock();
        match load() {
            Ok(Some(chunk)) => {
                chunks.put(chunk.id, chunk.clone());
                Ok(Some(chunk))
            }
            Ok(None) => {
                chunks.remove(chunk_id);
                Ok(None)
            }
            Err(e) => {
                chunks.remove(chunk_id);
                Err(e)
            }
        }
    }

    pub fn index_stats(&self) -> CacheStats {
        self.indexes.lock().stats
    }

    pub fn chunk_stats(&self) -> CacheStats {
        self.chunks.lock().stats
    }

    /// Drop every cached entry. Counters are kept.
    pub fn clear(&self) {
        self.indexes.lock().clear();
        self.chunks.lock().clear();
    }
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("indexes", &self.index_stats())
            .field("chunks", &self.chunk_stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::vector::core::distance::DistanceMetric;
    use crate::vector::index::flat::BruteForceIndex;
    use crate::vector::index::share;

    fn chunk() -> Chunk {
        Chunk::new(Uuid::new_v4(), "t".into(), vec![1.0], HashMap::new())
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = IndexCache::new(&CacheConfig::default().index_capacity(0)).unwrap_err();
        assert!(matches!(err, QuarryError::InvalidConfig(_)));
        assert!(CacheConfig::default().chunk_capacity(0).validate().is_err());
    }

    #[test]
    fn test_chunk_lru_eviction() {
        let cache = IndexCache::new(&CacheConfig::default().chunk_capacity(2)).unwrap();
        let (a, b, c) = (chunk(), chunk(), chunk());
        cache.put_chunk(a.clone());
        cache.put_chunk(b.clone());
        // Touch `a` so `b` becomes least recently used.
        assert!(cache.get_chunk(&a.id).is_some());
        cache.put_chunk(c.clone());

        assert!(cache.get_chunk(&b.id).is_none());
        assert!(cache.get_chunk(&a.id).is_some());
        assert!(cache.get_chunk(&c.id).is_some());

        let stats = cache.chunk_stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_reinsert_is_not_an_eviction() {
        let cache = IndexCache::new(&CacheConfig::default().chunk_capacity(1)).unwrap();
        let mut a = chunk();
        cache.put_chunk(a.clone());
        a.text = "changed".into();
        cache.put_chunk(a.clone());
        assert_eq!(cache.chunk_stats().evictions, 0);
        assert_eq!(cache.get_chunk(&a.id).unwrap().text, "changed");
    }

    #[test]
    fn test_index_entries_are_shared_handles() {
        let cache = IndexCache::new(&CacheConfig::default()).unwrap();
        let library = Uuid::new_v4();
        let index = share(Box::new(BruteForceIndex::new(2, DistanceMetric::Euclidean)));
        cache.put_index(library, index.clone());

        let cached = cache.get_index(&library).unwrap();
        index.write().add(Uuid::new_v4(), &[1.0, 2.0]).unwrap();
        assert_eq!(cached.read().len(), 1);

        assert!(cache.remove_index(&library).is_some());
        assert!(cache.get_index(&library).is_none());
    }

    #[test]
    fn test_get_or_load_chunk_only_loads_on_miss() {
        let cache = IndexCache::new(&CacheConfig::default()).unwrap();
        let c = chunk();

        let loaded = cache
            .get_or_load_chunk(&c.id, || Ok(Some(c.clone())))
            .unwrap();
        assert_eq!(loaded, Some(c.clone()));

        let cached = cache
            .get_or_load_chunk(&c.id, || panic!("loader called on a hit"))
            .unwrap();
        assert_eq!(cached, Some(c.clone()));

        let missing = Uuid::new_v4();
        assert_eq!(cache.get_or_load_chunk(&missing, || Ok(None)).unwrap(), None);
        assert!(cache.get_chunk(&missing).is_none());
    }

    #[test]
    fn test_refresh_chunk_replaces_stale_entry() {
        let cache = IndexCache::new(&CacheConfig::default()).unwrap();
        let stale = chunk();
        let mut fresh = stale.clone();
        fresh.text = "fresh".to_string();

        cache.put_chunk(stale.clone());
        cache.refresh_chunk(&stale.id, || Ok(Some(fresh.clone()))).unwrap();
        assert_eq!(cache.get_chunk(&stale.id).map(|c| c.text), Some("fresh".to_string()));

        cache.refresh_chunk(&stale.id, || Ok(None)).unwrap();
        assert!(cache.get_chunk(&stale.id).is_none());

        cache.put_chunk(stale.clone());
        assert!(
            cache
                .refresh_chunk(&stale.id, || Err(QuarryError::storage("unreadable")))
                .is_err()
        );
        assert!(cache.get_chunk(&stale.id).is_none());
    }
}
