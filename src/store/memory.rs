//! In-process metadata store with optional JSON snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{Chunk, Document, Library};
use crate::error::{QuarryError, Result};
use crate::storage::Storage;
use crate::store::MetadataStore;

/// Snapshot file written after every mutation when a storage is attached.
pub const SNAPSHOT_FILE: &str = "metadata/snapshot.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Records {
    #[serde(default)]
    libraries: HashMap<Uuid, Library>,
    #[serde(default)]
    documents: HashMap<Uuid, Document>,
    #[serde(default)]
    chunks: HashMap<Uuid, Chunk>,
}

/// [`MetadataStore`] backed by hash maps behind a single lock.
///
/// With [`InMemoryMetadataStore::with_storage`] every mutation is followed by
/// a full snapshot write, so a new store opened on the same storage sees the
/// same records.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<Records>,
    storage: Option<Arc<dyn Storage>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted in `storage`, loading the existing snapshot if any.
    pub fn with_storage(storage: Arc<dyn Storage>) -> Result<Self> {
        let records = if storage.file_exists(SNAPSHOT_FILE) {
            let bytes = storage.read_all(SNAPSHOT_FILE)?;
            Self::from_snapshot(&bytes)?
        } else {
            Records::default()
        };
        debug!(
            "opened metadata store: {} libraries, {} documents, {} chunks",
            records.libraries.len(),
            records.documents.len(),
            records.chunks.len()
        );
        Ok(Self {
            records: RwLock::new(records),
            storage: Some(storage),
        })
    }

    /// Serialize all records.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let guard = self.records.read();
        serde_json::to_vec(&*guard).map_err(QuarryError::from)
    }

    fn from_snapshot(bytes: &[u8]) -> Result<Records> {
        if bytes.is_empty() {
            return Ok(Records::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Apply a mutation. With storage attached the mutation is staged on a
    /// copy and only becomes visible once its snapshot has been written.
    fn write<T>(&self, f: impl FnOnce(&mut Records) -> Result<T>) -> Result<T> {
        let mut guard = self.records.write();
        let Some(storage) = &self.storage else {
            return f(&mut guard);
        };
        let mut staged = guard.clone();
        let value = f(&mut staged)?;
        let bytes = serde_json::to_vec(&staged)?;
        storage.write_all(SNAPSHOT_FILE, &bytes)?;
        *guard = staged;
        Ok(value)
    }
}

fn sorted_by_creation<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

impl MetadataStore for InMemoryMetadataStore {
    fn insert_library(&self, library: Library) -> Result<()> {
        self.write(|r| {
            r.libraries.insert(library.id, library);
            Ok(())
        })
    }

    fn get_library(&self, id: &Uuid) -> Result<Option<Library>> {
        Ok(self.records.read().libraries.get(id).cloned())
    }

    fn list_libraries(&self) -> Result<Vec<Library>> {
        let items = self.records.read().libraries.values().cloned().collect();
        Ok(sorted_by_creation(items, |l: &Library| (l.created_at, l.id)))
    }

    fn update_library(&self, library: Library) -> Result<()> {
        self.write(|r| match r.libraries.get_mut(&library.id) {
            Some(slot) => {
                *slot = library;
                Ok(())
            }
            None => Err(QuarryError::not_found(format!("library {}", library.id))),
        })
    }

    fn delete_library(&self, id: &Uuid) -> Result<Option<Library>> {
        self.write(|r| Ok(r.libraries.remove(id)))
    }

    fn insert_document(&self, document: Document) -> Result<()> {
        self.write(|r| {
            r.documents.insert(document.id, document);
            Ok(())
        })
    }

    fn get_document(&self, id: &Uuid) -> Result<Option<Document>> {
        Ok(self.records.read().documents.get(id).cloned())
    }

    fn list_documents(&self, library_id: &Uuid) -> Result<Vec<Document>> {
        let items = self
            .records
            .read()
            .documents
            .values()
            .filter(|d| d.library_id == *library_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(items, |d: &Document| (d.created_at, d.id)))
    }

    fn update_document(&self, document: Document) -> Result<()> {
        self.write(|r| match r.documents.get_mut(&document.id) {
            Some(slot) => {
                *slot = document;
                Ok(())
            }
            None => Err(QuarryError::not_found(format!("document {}", document.id))),
        })
    }

    fn delete_document(&self, id: &Uuid) -> Result<Option<Document>> {
        self.write(|r| Ok(r.documents.remove(id)))
    }

    fn insert_chunk(&self, chunk: Chunk) -> Result<()> {
        self.write(|r| {
            r.chunks.insert(chunk.id, chunk);
            Ok(())
        })
    }

    fn get_chunk(&self, id: &Uuid) -> Result<Option<Chunk>> {
        Ok(self.records.read().chunks.get(id).cloned())
    }

    fn list_chunks(&self, document_id: &Uuid) -> Result<Vec<Chunk>> {
        let items = self
            .records
            .read()
            .chunks
            .values()
            .filter(|c| c.document_id == *document_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(items, |c: &Chunk| (c.created_at, c.id)))
    }

    fn list_chunks_by_library(&self, library_id: &Uuid) -> Result<Vec<Chunk>> {
        let guard = self.records.read();
        let documents: HashSet<Uuid> = guard
            .documents
            .values()
            .filter(|d| d.library_id == *library_id)
            .map(|d| d.id)
            .collect();
        let items = guard
            .chunks
            .values()
            .filter(|c| documents.contains(&c.document_id))
            .cloned()
            .collect();
        Ok(sorted_by_creation(items, |c: &Chunk| (c.created_at, c.id)))
    }

    fn update_chunk(&self, chunk: Chunk) -> Result<()> {
        self.write(|r| match r.chunks.get_mut(&chunk.id) {
            Some(slot) => {
                *slot = chunk;
                Ok(())
            }
            None => Err(QuarryError::not_found(format!("chunk {}", chunk.id))),
        })
    }

    fn delete_chunk(&self, id: &Uuid) -> Result<Option<Chunk>> {
        self.write(|r| Ok(r.chunks.remove(id)))
    }
}
