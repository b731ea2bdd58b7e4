//! Keeps each library's vector index consistent with its chunks.
//!
//! Every index mutation of a library runs under that library's lock, taken
//! from a lock table keyed by library id. Searches only take the index's read
//! lock, so they run concurrently with each other and never observe a
//! half-applied mutation.
//!
//! The metadata store is the source of truth. An index that is missing from
//! both the cache and storage is rebuilt by rescanning the library's chunks,
//! which costs O(n) embeddings.

use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::store::MetadataStore;
use crate::vector::core::option::{IndexConfig, IndexKind};
use crate::vector::index::factory::IndexFactory;
use crate::vector::index::flat::BruteForceIndex;
use crate::vector::index::{
    SearchHit, SharedIndex, VectorIndex, share, validate_dimension, validate_finite,
};
use crate::vector::repository::{IndexRepository, index_file_name};

/// Largest `k` accepted by [`IndexCoordinator::search`] unless configured otherwise.
pub const DEFAULT_MAX_K: usize = 50;

/// Owns the index lifecycle of every library.
#[derive(Debug)]
pub struct IndexCoordinator {
    store: Arc<dyn MetadataStore>,
    repository: IndexRepository,
    config: IndexConfig,
    max_k: usize,
    locks: Mutex<AHashMap<Uuid, Arc<Mutex<()>>>>,
}

impl IndexCoordinator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        repository: IndexRepository,
        config: IndexConfig,
        max_k: usize,
    ) -> Result<Self> {
        config.validate()?;
        if max_k == 0 {
            return Err(QuarryError::invalid_config("max_k must be greater than zero"));
        }
        Ok(Self {
            store,
            repository,
            config,
            max_k,
            locks: Mutex::new(AHashMap::new()),
        })
    }

    pub fn repository(&self) -> &IndexRepository {
        &self.repository
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn max_k(&self) -> usize {
        self.max_k
    }

    fn library_lock(&self, library_id: &Uuid) -> Arc<Mutex<()>> {
        self.locks.lock().entry(*library_id).or_default().clone()
    }

    /// Build an empty index for a new library and register it.
    pub fn create_index(&self, library_id: &Uuid, kind: IndexKind) -> Result<SharedIndex> {
        let lock = self.library_lock(library_id);
        let _guard = lock.lock();

        let index = share(IndexFactory::create(kind, &self.config)?);
        self.repository.save(library_id, &index)?;
        info!("created {kind} index for library {library_id}");
        Ok(index)
    }

    /// Return the library's index, restoring or rebuilding it when needed.
    pub fn resolve(&self, library_id: &Uuid) -> Result<SharedIndex> {
        if let Some(index) = self.repository.cache().get_index(library_id) {
            return Ok(index);
        }
        let lock = self.library_lock(library_id);
        let _guard = lock.lock();
        self.resolve_locked(library_id)
    }

    fn resolve_locked(&self, library_id: &Uuid) -> Result<SharedIndex> {
        match self.repository.load(library_id) {
            Ok(Some(index)) => return Ok(index),
            Ok(None) => {}
            Err(e) => {
                warn!("discarding unreadable index of library {library_id}: {e}");
                self.repository.delete(library_id)?;
            }
        }
        let library = self
            .store
            .get_library(library_id)?
            .ok_or_else(|| QuarryError::not_found(format!("library {library_id}")))?;
        self.rebuild_locked(library_id, library.index_type)
    }

    /// Discard any current index and rebuild it from the library's chunks.
    pub fn rebuild(&self, library_id: &Uuid, kind: IndexKind) -> Result<SharedIndex> {
        let lock = self.library_lock(library_id);
        let _guard = lock.lock();
        self.rebuild_locked(library_id, kind)
    }

    fn rebuild_locked(&self, library_id: &Uuid, kind: IndexKind) -> Result<SharedIndex> {
        let mut index = IndexFactory::create(kind, &self.config)?;
        let skipped = self.populate(library_id, index.as_mut())?;
        if skipped > 0 {
            warn!("skipped {skipped} chunks with unusable embeddings while rebuilding library {library_id}");
        }
        info!(
            "rebuilt {kind} index for library {library_id} with {} vectors",
            index.len()
        );
        let shared = share(index);
        if let Err(e) = self.repository.save(library_id, &shared) {
            // Serve the rebuilt index from memory; a stale file must not outlive it.
            warn!("could not persist rebuilt index of library {library_id}: {e}");
            self.repository.storage().delete_file(&index_file_name(library_id))?;
            self.repository.cache().put_index(*library_id, shared.clone());
        }
        Ok(shared)
    }

    /// Insert every current chunk of the library. Returns the number skipped.
    fn populate(&self, library_id: &Uuid, index: &mut dyn VectorIndex) -> Result<usize> {
        let mut skipped = 0;
        for chunk in self.store.list_chunks_by_library(library_id)? {
            if let Err(e) = index.add(chunk.id, &chunk.embedding) {
                debug!("chunk {} not indexed: {e}", chunk.id);
                skipped += 1;
            }
        }
        Ok(skipped)
    }

    /// Index a newly committed chunk.
    pub fn add_chunk(&self, library_id: &Uuid, chunk_id: Uuid, embedding: &[f32]) -> Result<()> {
        validate_dimension(self.config.dimension, embedding)?;
        self.mutate(library_id, |index| index.add(chunk_id, embedding))
    }

    /// Replace the vector of an existing chunk.
    pub fn replace_chunk(
        &self,
        library_id: &Uuid,
        chunk_id: Uuid,
        embedding: &[f32],
    ) -> Result<()> {
        validate_dimension(self.config.dimension, embedding)?;
        self.mutate(library_id, |index| {
            index.remove(&chunk_id);
            index.add(chunk_id, embedding)
        })
    }

    /// Remove a chunk's vector. An index left empty stays registered.
    pub fn remove_chunk(&self, library_id: &Uuid, chunk_id: &Uuid) -> Result<()> {
        self.mutate(library_id, |index| {
            index.remove(chunk_id);
            Ok(())
        })
    }

    /// Remove several chunks' vectors under one lock acquisition.
    pub fn remove_chunks(&self, library_id: &Uuid, chunk_ids: &[Uuid]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        self.mutate(library_id, |index| {
            for id in chunk_ids {
                index.remove(id);
            }
            Ok(())
        })
    }

    fn mutate<F>(&self, library_id: &Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn VectorIndex) -> Result<()>,
    {
        let lock = self.library_lock(library_id);
        let _guard = lock.lock();

        let index = self.resolve_locked(library_id)?;
        {
            let mut guard = index.write();
            f(guard.as_mut())?;
        }
        self.repository.save(library_id, &index)
    }

    /// Replace the library's index with an index of another kind.
    pub fn change_index_type(&self, library_id: &Uuid, kind: IndexKind) -> Result<SharedIndex> {
        let lock = self.library_lock(library_id);
        let _guard = lock.lock();

        self.repository.delete(library_id)?;
        let index = self.rebuild_locked(library_id, kind)?;
        info!("library {library_id} now uses a {kind} index");
        Ok(index)
    }

    /// Destroy the library's index.
    pub fn drop_index(&self, library_id: &Uuid) -> Result<()> {
        let lock = self.library_lock(library_id);
        {
            let _guard = lock.lock();
            self.repository.delete(library_id)?;
        }
        self.locks.lock().remove(library_id);
        info!("dropped index of library {library_id}");
        Ok(())
    }

    /// Forget the library's index so the next access rebuilds it.
    pub fn invalidate(&self, library_id: &Uuid) {
        let lock = self.library_lock(library_id);
        let _guard = lock.lock();
        if let Err(e) = self.repository.delete(library_id) {
            warn!("failed to discard persisted index of library {library_id}: {e}");
            self.repository.evict(library_id);
        }
    }

    /// Absorb the outcome of index maintenance that follows a committed
    /// metadata write.
    ///
    /// A failure is logged and the library's index invalidated, so the caller
    /// still sees its metadata write succeed.
    pub fn settle(&self, library_id: &Uuid, action: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!("index maintenance '{action}' failed for library {library_id}: {e}; index will be rebuilt");
            self.invalidate(library_id);
        }
    }

    /// Nearest chunks of a library to `query`.
    ///
    /// An approximate index that finds nothing is backed up by an exact scan
    /// over the library's current chunks.
    pub fn search(&self, library_id: &Uuid, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || k > self.max_k {
            return Err(QuarryError::invalid_argument(format!(
                "k must be between 1 and {}, got {k}",
                self.max_k
            )));
        }
        validate_dimension(self.config.dimension, query)?;
        validate_finite(query)?;

        let index = self.resolve(library_id)?;
        let (kind, hits) = {
            let guard = index.read();
            (guard.kind(), guard.search(query, k)?)
        };
        if !hits.is_empty() || !kind.is_approximate() {
            return Ok(hits);
        }

        info!("{kind} index of library {library_id} returned no candidates; falling back to exact search");
        self.exact_search(library_id, query, k)
    }

    fn exact_search(&self, library_id: &Uuid, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let mut index = BruteForceIndex::new(self.config.dimension, self.config.brute_force.metric);
        self.populate(library_id, &mut index)?;
        index.search(query, k)
    }
}
