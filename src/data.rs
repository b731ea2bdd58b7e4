//! Library, document and chunk records and their create/update payloads.
//!
//! Ownership is hierarchical: a library owns documents, a document owns
//! chunks, and every chunk carries one embedding that lives in its library's
//! vector index under the chunk id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vector::core::option::IndexKind;

/// A named collection of documents sharing one vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub index_type: IndexKind,
    pub created_at: DateTime<Utc>,
}

impl Library {
    pub fn new(create: LibraryCreate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: create.name,
            description: create.description,
            index_type: create.index_type.unwrap_or_default(),
            created_at: Utc::now(),
        }
    }

    /// Apply the fields present in `update`.
    pub fn apply(&mut self, update: LibraryUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(index_type) = update.index_type {
            self.index_type = index_type;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Index variant; the engine default applies when absent.
    #[serde(default)]
    pub index_type: Option<IndexKind>,
}

impl LibraryCreate {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn index_type(mut self, index_type: IndexKind) -> Self {
        self.index_type = Some(index_type);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub index_type: Option<IndexKind>,
}

impl LibraryUpdate {
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn index_type(mut self, index_type: IndexKind) -> Self {
        self.index_type = Some(index_type);
        self
    }
}

/// A document within a library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub library_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(library_id: Uuid, create: DocumentCreate) -> Self {
        Self {
            id: Uuid::new_v4(),
            library_id,
            title: create.title,
            source: create.source,
            description: create.description,
            created_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, update: DocumentUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(source) = update.source {
            self.source = Some(source);
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentCreate {
    pub title: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DocumentCreate {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DocumentUpdate {
    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A piece of text with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Build a chunk record from a payload whose embedding has been resolved.
    pub fn new(
        document_id: Uuid,
        text: String,
        embedding: Vec<f32>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            text,
            embedding,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Payload for a new chunk. Without an embedding, one is derived from `text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkCreate {
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChunkCreate {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Partial chunk update.
///
/// A new `text` without an `embedding` is re-embedded when the engine has a
/// text embedder; otherwise the stored embedding is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkUpdate {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl ChunkUpdate {
    pub fn text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
