//! Metadata storage for libraries, documents and chunks.
//!
//! The store is the authoritative record of what exists. Vector indexes are
//! derived state and can always be rebuilt from
//! [`MetadataStore::list_chunks_by_library`].

pub mod memory;

use std::fmt::Debug;

use uuid::Uuid;

use crate::data::{Chunk, Document, Library};
use crate::error::Result;

pub use self::memory::InMemoryMetadataStore;

/// Record-level CRUD over the library → document → chunk hierarchy.
///
/// Implementations do not cascade: deleting a library leaves its documents in
/// place. Referential checks (e.g. that a document's library exists) are the
/// caller's responsibility.
pub trait MetadataStore: Send + Sync + Debug {
    fn insert_library(&self, library: Library) -> Result<()>;
    fn get_library(&self, id: &Uuid) -> Result<Option<Library>>;
    /// All libraries, oldest first.
    fn list_libraries(&self) -> Result<Vec<Library>>;
    /// Replace an existing library record. Fails with `NotFound` if absent.
    fn update_library(&self, library: Library) -> Result<()>;
    /// Remove a library record, returning it if it existed.
    fn delete_library(&self, id: &Uuid) -> Result<Option<Library>>;

    fn insert_document(&self, document: Document) -> Result<()>;
    fn get_document(&self, id: &Uuid) -> Result<Option<Document>>;
    /// Documents of a library, oldest first.
    fn list_documents(&self, library_id: &Uuid) -> Result<Vec<Document>>;
    fn update_document(&self, document: Document) -> Result<()>;
    fn delete_document(&self, id: &Uuid) -> Result<Option<Document>>;

    fn insert_chunk(&self, chunk: Chunk) -> Result<()>;
    fn get_chunk(&self, id: &Uuid) -> Result<Option<Chunk>>;
    /// Chunks of a document, oldest first.
    fn list_chunks(&self, document_id: &Uuid) -> Result<Vec<Chunk>>;
    /// Chunks of every document in a library.
    fn list_chunks_by_library(&self, library_id: &Uuid) -> Result<Vec<Chunk>>;
    fn update_chunk(&self, chunk: Chunk) -> Result<()>;
    fn delete_chunk(&self, id: &Uuid) -> Result<Option<Chunk>>;
}
