//! Query request and result types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::Chunk;

/// Default number of results.
pub const DEFAULT_K: usize = 5;

fn default_k() -> usize {
    DEFAULT_K
}

/// Equality filter on chunk metadata. Every pair must match.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    #[serde(default)]
    pub equals: HashMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.equals
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// Nearest-neighbour query against one library.
///
/// An `embedding` takes precedence over `text`; text is embedded as a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub filters: MetadataFilter,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            embedding: None,
            text: None,
            k: DEFAULT_K,
            filters: MetadataFilter::default(),
        }
    }
}

impl QueryRequest {
    pub fn from_embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..Default::default()
        }
    }

    pub fn from_text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn filter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.filters = self.filters.equals(key, value);
        self
    }
}

/// One matching chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    /// Similarity in `[0, 1]`, higher is better.
    pub score: f32,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl QueryResult {
    pub(crate) fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            score: score.min(1.0),
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: QueryRequest = serde_json::from_str(r#"{"text": "rust"}"#).unwrap();
        assert_eq!(request.k, 5);
        assert!(request.embedding.is_none());
        assert!(request.filters.is_empty());
    }

    #[test]
    fn test_filter_matches_all_pairs() {
        let filter = MetadataFilter::new().equals("lang", "en").equals("kind", "faq");
        let mut metadata = HashMap::from([("lang".to_string(), "en".to_string())]);
        assert!(!filter.matches(&metadata));
        metadata.insert("kind".into(), "faq".into());
        assert!(filter.matches(&metadata));
        assert!(MetadataFilter::new().matches(&HashMap::new()));
    }

    #[test]
    fn test_result_score_is_capped() {
        let chunk = Chunk::new(Uuid::new_v4(), "t".into(), vec![], HashMap::new());
        assert_eq!(QueryResult::new(chunk, 1.0000001).score, 1.0);
    }
}
