pub mod config;
pub mod query;

use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::data::{
    Chunk, ChunkCreate, ChunkUpdate, Document, DocumentCreate, DocumentUpdate, Library,
    LibraryCreate, LibraryUpdate,
};
use crate::embedding::embedder::{EmbedInputType, Embedder};
use crate::embedding::executor::EmbedderExecutor;
use crate::embedding::precomputed::PrecomputedEmbedder;
use crate::error::{QuarryError, Result};
use crate::storage::Storage;
use crate::storage::memory::MemoryStorage;
use crate::store::{InMemoryMetadataStore, MetadataStore};
use crate::vector::cache::{CacheStats, IndexCache};
use crate::vector::coordinator::IndexCoordinator;
use crate::vector::index::{validate_dimension, validate_finite};
use crate::vector::repository::IndexRepository;

use self::config::EngineConfig;
use self::query::{QueryRequest, QueryResult};

/// Library, document and chunk management with nearest-neighbour queries.
///
/// Metadata writes go to the [`MetadataStore`] first. Index maintenance
/// follows and is best-effort: a failure is logged and the affected library's
/// index is rebuilt on its next use, so a committed write is never reported as
/// failed because of its index.
///
/// Embedding providers are always called before any library lock is taken.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn MetadataStore>,
    cache: Arc<IndexCache>,
    coordinator: IndexCoordinator,
    embedder: Arc<dyn Embedder>,
    executor: Option<EmbedderExecutor>,
}

impl Engine {
    /// Create an engine whose metadata and indexes live in `storage`.
    ///
    /// Reopening the same storage restores all libraries, documents and
    /// chunks. Persistent indexes are loaded lazily on first use.
    pub fn new(storage: Arc<dyn Storage>, config: EngineConfig) -> Result<Self> {
        let store = Arc::new(InMemoryMetadataStore::with_storage(storage.clone())?);
        Self::with_store(storage, store, config)
    }

    /// Create an engine that keeps everything in memory.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::with_store(
            Arc::new(MemoryStorage::default()),
            Arc::new(InMemoryMetadataStore::new()),
            config,
        )
    }

    /// Create an engine over an existing metadata store.
    pub fn with_store(
        storage: Arc<dyn Storage>,
        store: Arc<dyn MetadataStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(IndexCache::new(&config.cache)?);
        let repository = IndexRepository::new(storage, cache.clone());
        let coordinator = IndexCoordinator::new(
            store.clone(),
            repository,
            config.index_config(),
            config.max_k,
        )?;

        let embedder: Arc<dyn Embedder> = config
            .embedder
            .clone()
            .unwrap_or_else(|| Arc::new(PrecomputedEmbedder::new()));
        let executor = if embedder.supports_text() {
            Some(EmbedderExecutor::new()?)
        } else {
            None
        };
        info!(
            "engine ready: dimension={}, default index={}, embedder={}",
            config.dimension,
            config.default_index_type,
            embedder.name()
        );

        Ok(Self {
            config,
            store,
            cache,
            coordinator,
            embedder,
            executor,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &IndexCoordinator {
        &self.coordinator
    }

    pub fn index_cache_stats(&self) -> CacheStats {
        self.cache.index_stats()
    }

    pub fn chunk_cache_stats(&self) -> CacheStats {
        self.cache.chunk_stats()
    }

    pub fn create_library(&self, mut create: LibraryCreate) -> Result<Library> {
        create
            .index_type
            .get_or_insert(self.config.default_index_type);
        let library = Library::new(create);
        self.store.insert_library(library.clone())?;

        let created = self
            .coordinator
            .create_index(&library.id, library.index_type)
            .map(|_| ());
        self.coordinator
            .settle(&library.id, "create index", created);
        Ok(library)
    }

    pub fn get_library(&self, id: &Uuid) -> Result<Library> {
        self.store
            .get_library(id)?
            .ok_or_else(|| QuarryError::not_found(format!("library {id}")))
    }

    pub fn list_libraries(&self) -> Result<Vec<Library>> {
        self.store.list_libraries()
    }

    /// Update a library. Changing its index type rebuilds the index.
    pub fn update_library(&self, id: &Uuid, update: LibraryUpdate) -> Result<Library> {
        let mut library = self.get_library(id)?;
        let previous = library.index_type;
        library.apply(update);
        self.store.update_library(library.clone())?;

        if library.index_type != previous {
            let changed = self
                .coordinator
                .change_index_type(id, library.index_type)
                .map(|_| ());
            self.coordinator.settle(id, "change index type", changed);
        }
        Ok(library)
    }

    /// Delete a library with all of its documents, chunks and its index.
    pub fn delete_library(&self, id: &Uuid) -> Result<()> {
        self.get_library(id)?;

        for document in self.store.list_documents(id)? {
            self.delete_document_and_vectors(&document)?;
        }
        self.store.delete_library(id)?;

        if let Err(e) = self.coordinator.drop_index(id) {
            warn!("failed to drop index of deleted library {id}: {e}");
        }
        info!("deleted library {id}");
        Ok(())
    }

    pub fn create_document(&self, library_id: &Uuid, create: DocumentCreate) -> Result<Document> {
        self.get_library(library_id)?;
        let document = Document::new(*library_id, create);
        self.store.insert_document(document.clone())?;
        Ok(document)
    }

    pub fn get_document(&self, id: &Uuid) -> Result<Document> {
        self.store
            .get_document(id)?
            .ok_or_else(|| QuarryError::not_found(format!("document {id}")))
    }

    pub fn list_documents(&self, library_id: &Uuid) -> Result<Vec<Document>> {
        self.get_library(library_id)?;
        self.store.list_documents(library_id)
    }

    pub fn update_document(&self, id: &Uuid, update: DocumentUpdate) -> Result<Document> {
        let mut document = self.get_document(id)?;
        document.apply(update);
        self.store.update_document(document.clone())?;
        Ok(document)
    }

    /// Delete a document and its chunks, removing their vectors from the index.
    pub fn delete_document(&self, id: &Uuid) -> Result<()> {
        let document = self.get_document(id)?;
        self.delete_document_and_vectors(&document)
    }

    /// Delete a document's records, then remove its chunks' vectors.
    ///
    /// A failure part way through the record deletion invalidates the
    /// library's index, which is then rebuilt from the surviving chunks.
    fn delete_document_and_vectors(&self, document: &Document) -> Result<()> {
        let chunk_ids = match self.delete_document_records(document) {
            Ok(chunk_ids) => chunk_ids,
            Err(e) => {
                self.coordinator.invalidate(&document.library_id);
                return Err(e);
            }
        };
        let removed = self
            .coordinator
            .remove_chunks(&document.library_id, &chunk_ids);
        self.coordinator
            .settle(&document.library_id, "remove document chunks", removed);
        Ok(())
    }

    /// Delete a document record and its chunk records. Returns the chunk ids.
    fn delete_document_records(&self, document: &Document) -> Result<Vec<Uuid>> {
        let mut chunk_ids = Vec::new();
        for chunk in self.store.list_chunks(&document.id)? {
            self.store.delete_chunk(&chunk.id)?;
            self.refresh_cached_chunk(&chunk.id);
            chunk_ids.push(chunk.id);
        }
        self.store.delete_document(&document.id)?;
        debug!(
            "deleted document {} with {} chunks",
            document.id,
            chunk_ids.len()
        );
        Ok(chunk_ids)
    }

    /// Add a chunk to a document.
    ///
    /// Without an embedding in `create`, the text is embedded as a document.
    pub fn create_chunk(&self, document_id: &Uuid, create: ChunkCreate) -> Result<Chunk> {
        let document = self.get_document(document_id)?;
        let embedding = match create.embedding {
            Some(embedding) => embedding,
            None => self.embed(&create.text, EmbedInputType::Document)?,
        };
        self.validate_embedding(&embedding)?;

        let chunk = Chunk::new(*document_id, create.text, embedding, create.metadata);
        self.store.insert_chunk(chunk.clone())?;
        self.cache.put_chunk(chunk.clone());

        let added = self
            .coordinator
            .add_chunk(&document.library_id, chunk.id, &chunk.embedding);
        self.coordinator
            .settle(&document.library_id, "add chunk", added);
        Ok(chunk)
    }

    pub fn get_chunk(&self, id: &Uuid) -> Result<Chunk> {
        self.find_chunk(id)?
            .ok_or_else(|| QuarryError::not_found(format!("chunk {id}")))
    }

    fn find_chunk(&self, id: &Uuid) -> Result<Option<Chunk>> {
        self.cache.get_or_load_chunk(id, || self.store.get_chunk(id))
    }

    /// Committed chunk record, bypassing the cache.
    fn stored_chunk(&self, id: &Uuid) -> Result<Chunk> {
        self.store
            .get_chunk(id)?
            .ok_or_else(|| QuarryError::not_found(format!("chunk {id}")))
    }

    /// Bring the cached copy of a chunk in line with the store after a write.
    /// An unreadable record is simply left out of the cache.
    fn refresh_cached_chunk(&self, id: &Uuid) {
        if let Err(e) = self.cache.refresh_chunk(id, || self.store.get_chunk(id)) {
            warn!("dropped cached chunk {id}: {e}");
        }
    }

    pub fn list_chunks(&self, document_id: &Uuid) -> Result<Vec<Chunk>> {
        self.get_document(document_id)?;
        self.store.list_chunks(document_id)
    }

    /// Update a chunk. The index is only touched when the embedding changes.
    pub fn update_chunk(&self, id: &Uuid, update: ChunkUpdate) -> Result<Chunk> {
        let mut chunk = self.stored_chunk(id)?;
        let document = self.get_document(&chunk.document_id)?;

        let text_changed = update.text.as_ref().is_some_and(|t| *t != chunk.text);
        let embedding = match update.embedding {
            Some(embedding) => Some(embedding),
            None if text_changed && self.executor.is_some() => {
                let text = update.text.as_deref().unwrap_or_default();
                Some(self.embed(text, EmbedInputType::Document)?)
            }
            None => None,
        };
        if let Some(embedding) = &embedding {
            self.validate_embedding(embedding)?;
        }

        if let Some(text) = update.text {
            chunk.text = text;
        }
        if let Some(metadata) = update.metadata {
            chunk.metadata = metadata;
        }
        let embedding_changed = match embedding {
            Some(embedding) if embedding != chunk.embedding => {
                chunk.embedding = embedding;
                true
            }
            _ => false,
        };

        self.store.update_chunk(chunk.clone())?;
        self.refresh_cached_chunk(&chunk.id);

        if embedding_changed {
            let replaced =
                self.coordinator
                    .replace_chunk(&document.library_id, chunk.id, &chunk.embedding);
            self.coordinator
                .settle(&document.library_id, "replace chunk", replaced);
        }
        Ok(chunk)
    }

    pub fn delete_chunk(&self, id: &Uuid) -> Result<()> {
        let chunk = self.stored_chunk(id)?;
        let library_id = self.get_document(&chunk.document_id)?.library_id;

        self.store.delete_chunk(id)?;
        self.refresh_cached_chunk(id);

        let removed = self.coordinator.remove_chunk(&library_id, id);
        self.coordinator.settle(&library_id, "remove chunk", removed);
        Ok(())
    }

    /// Find the chunks of a library nearest to the request's embedding or text.
    ///
    /// Metadata filters are applied to the nearest candidates; with filters
    /// present the search is widened to `max_k` before filtering.
    pub fn query(&self, library_id: &Uuid, request: QueryRequest) -> Result<Vec<QueryResult>> {
        self.get_library(library_id)?;
        if request.k == 0 || request.k > self.config.max_k {
            return Err(QuarryError::invalid_argument(format!(
                "k must be between 1 and {}, got {}",
                self.config.max_k, request.k
            )));
        }

        let embedding = match (request.embedding, request.text.as_deref()) {
            (Some(embedding), _) => embedding,
            (None, Some(text)) => self.embed(text, EmbedInputType::Query)?,
            (None, None) => {
                return Err(QuarryError::invalid_argument(
                    "query requires an embedding or a text",
                ));
            }
        };

        let fetch = if request.filters.is_empty() {
            request.k
        } else {
            self.config.max_k
        };
        let hits = self.coordinator.search(library_id, &embedding, fetch)?;

        let mut results = Vec::with_capacity(request.k);
        for hit in hits {
            let Some(chunk) = self.find_chunk(&hit.id)? else {
                warn!("indexed chunk {} of library {library_id} no longer exists", hit.id);
                continue;
            };
            if !request.filters.matches(&chunk.metadata) {
                continue;
            }
            results.push(QueryResult::new(chunk, hit.score));
            if results.len() == request.k {
                break;
            }
        }
        Ok(results)
    }

    fn embed(&self, text: &str, input_type: EmbedInputType) -> Result<Vec<f32>> {
        let Some(executor) = &self.executor else {
            return Err(QuarryError::invalid_argument(format!(
                "embedder '{}' cannot embed text; supply an embedding",
                self.embedder.name()
            )));
        };
        executor.embed(&self.embedder, text, input_type)
    }

    fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        validate_dimension(self.config.dimension, embedding)?;
        validate_finite(embedding)
    }
}
