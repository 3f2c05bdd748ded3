
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Embedding, EmbeddingProvider, ProviderError, check_dimension};
use crate::config::{ConfigError, ProviderConfig};
use crate::http::{JsonClient, join_segments};

const PROVIDER_NAME: &str = "ollama";

/// Client for a local or remote Ollama server's `/api/embed` endpoint
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    dimension: usize,
    client: JsonClient,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: config.endpoint_url()?,
            model: config.model_name().to_string(),
            dimension: config.dimension as usize,
            client: JsonClient::new(),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.client = self.client.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.client = self.client.with_backoff(backoff);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = join_segments(&self.base_url, &["api", "embed"]).map_err(|source| {
            ProviderError::Request {
                provider: PROVIDER_NAME,
                source,
            }
        })?;

        let request = EmbedRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimension,
        };

        let response: EmbedResponse = self
            .client
            .post_json(&url, &request)
            .await
            .map_err(|e| ProviderError::from_http(PROVIDER_NAME, e, error_detail))?;

        let embedding = response.embeddings.into_iter().next().unwrap_or_default();

        debug!("Generated embedding with {} dimensions", embedding.len());
        check_dimension(PROVIDER_NAME, self.dimension, embedding)
    }
}

fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|response| response.error)
}
