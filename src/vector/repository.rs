//! Persistence and caching of per-library indexes.

use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::storage::Storage;
use crate::vector::cache::IndexCache;
use crate::vector::index::lsh::LshIndex;
use crate::vector::index::serializer::IndexSerializer;
use crate::vector::index::{SharedIndex, VectorIndex, share};

/// Directory under which persisted indexes are stored.
pub const INDEX_DIR: &str = "indexes";

/// File name of a library's persisted index.
pub fn index_file_name(library_id: &Uuid) -> String {
    format!("{INDEX_DIR}/{library_id}.lsh")
}

/// Loads and saves library indexes through the cache and a storage backend.
#[derive(Debug, Clone)]
pub struct IndexRepository {
    storage: Arc<dyn Storage>,
    cache: Arc<IndexCache>,
}

impl IndexRepository {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<IndexCache>) -> Self {
        Self { storage, cache }
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Look up a library's index: cache first, then persisted state.
    ///
    /// A restored index is placed in the cache. `None` means no index exists
    /// in either place and the caller must rebuild it.
    pub fn load(&self, library_id: &Uuid) -> Result<Option<SharedIndex>> {
        if let Some(index) = self.cache.get_index(library_id) {
            return Ok(Some(index));
        }

        let name = index_file_name(library_id);
        let Some(index) = IndexSerializer::load(self.storage.as_ref(), &name)? else {
            return Ok(None);
        };
        debug!(
            "restored index for library {library_id} from {name} ({} vectors)",
            index.len()
        );
        let shared = share(Box::new(index));
        self.cache.put_index(*library_id, shared.clone());
        Ok(Some(shared))
    }

    /// Put an index into the cache and persist it when its variant is persistent.
    pub fn save(&self, library_id: &Uuid, index: &SharedIndex) -> Result<()> {
        self.persist(library_id, index)?;
        self.cache.put_index(*library_id, index.clone());
        Ok(())
    }

    /// Write an index to storage without touching the cache.
    pub fn persist(&self, library_id: &Uuid, index: &SharedIndex) -> Result<()> {
        let guard = index.read();
        if !guard.kind().is_persistent() {
            return Ok(());
        }
        let lsh = guard.as_any().downcast_ref::<LshIndex>().ok_or_else(|| {
            QuarryError::internal(format!(
                "index of kind {} has no persistent representation",
                guard.kind()
            ))
        })?;
        IndexSerializer::save(self.storage.as_ref(), &index_file_name(library_id), lsh)
    }

    /// Remove a library's index from the cache and from storage.
    pub fn delete(&self, library_id: &Uuid) -> Result<()> {
        self.cache.remove_index(library_id);
        self.storage.delete_file(&index_file_name(library_id))
    }

    /// Drop a library's index from the cache only.
    pub fn evict(&self, library_id: &Uuid) {
        self.cache.remove_index(library_id);
    }

    /// Whether a persisted index exists for the library.
    pub fn is_persisted(&self, library_id: &Uuid) -> bool {
        self.storage.file_exists(&index_file_name(library_id))
    }
}
