//! Cohere embedding provider.

use std::any::Any;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::embedding::embedder::{EmbedInputType, Embedder};
use crate::error::{QuarryError, Result};

/// Default Cohere API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.cohere.com/v1/embed";

/// Default model; produces 1024-dimensional embeddings.
pub const DEFAULT_MODEL: &str = "embed-english-v3.0";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "COHERE_API_KEY";

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: [&'a str; 1],
    model: &'a str,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeds text through the Cohere `/embed` API.
#[derive(Debug, Clone)]
pub struct CohereEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl CohereEmbedder {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Read the API key from `COHERE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(API_KEY_ENV).map_err(|_| {
            QuarryError::invalid_config(format!("{API_KEY_ENV} is not set"))
        })?;
        Ok(Self::new(key))
    }

    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn cohere_input_type(input_type: EmbedInputType) -> &'static str {
    match input_type {
        EmbedInputType::Document => "search_document",
        EmbedInputType::Query => "search_query",
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    async fn embed(&self, text: &str, input_type: EmbedInputType) -> Result<Vec<f32>> {
        let body = EmbedRequest {
            texts: [text],
            model: &self.model,
            input_type: cohere_input_type(input_type),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| QuarryError::embedding_provider(format!("cohere request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("cohere embed returned {status}: {detail}");
            return Err(QuarryError::embedding_provider(format!(
                "cohere returned {status}"
            )));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            QuarryError::embedding_provider(format!("malformed cohere response: {e}"))
        })?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| QuarryError::embedding_provider("cohere returned no embeddings"))
    }

    fn dimension(&self) -> Option<usize> {
        (self.model == DEFAULT_MODEL).then_some(1024)
    }

    fn name(&self) -> &str {
        "cohere"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = EmbedRequest {
            texts: ["hi"],
            model: DEFAULT_MODEL,
            input_type: cohere_input_type(EmbedInputType::Document),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["texts"][0], "hi");
        assert_eq!(json["input_type"], "search_document");
        assert_eq!(cohere_input_type(EmbedInputType::Query), "search_query");
    }

    #[test]
    fn test_known_dimension() {
        assert_eq!(CohereEmbedder::new("k").dimension(), Some(1024));
        assert_eq!(CohereEmbedder::new("k").model("other").dimension(), None);
    }
}
