#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Embedding, EmbeddingProvider, ProviderError, check_dimension};
use crate::config::{ConfigError, ProviderConfig};
use crate::config::settings::ENV_PROVIDER_API_KEY;
use crate::http::{JsonClient, join_segments};

const PROVIDER_NAME: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini `embedContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: JsonClient,
    endpoint: Url,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    status: Option<String>,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingSetting {
                key: "provider.api_key",
                env: ENV_PROVIDER_API_KEY,
            })?;

        Ok(Self {
            client: JsonClient::new().with_header(API_KEY_HEADER, api_key),
            endpoint: config.endpoint_url()?,
            model: config
                .model_name()
                .trim_start_matches("models/")
                .to_string(),
            dimension: config.dimension as usize,
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

    fn embed_url(&self) -> Result<Url, ProviderError> {
        let action = format!("{}:embedContent", self.model);
        join_segments(&self.endpoint, &["v1beta", "models", &action]).map_err(|source| {
            ProviderError::Request {
                provider: PROVIDER_NAME,
                source,
            }
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
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
        debug!("Generating Gemini embedding for text (length: {})", text.len());

        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: [Part { text }],
            },
            output_dimensionality: self.dimension,
        };

        let response: EmbedContentResponse = self
            .client
            .post_json(&self.embed_url()?, &request)
            .await
            .map_err(|e| ProviderError::from_http(PROVIDER_NAME, e, error_detail))?;

        let values = response
            .embedding
            .map(|embedding| embedding.values)
            .unwrap_or_default();

        check_dimension(PROVIDER_NAME, self.dimension, values)
    }
}

fn error_detail(body: &str) -> Option<String> {
    let response: ErrorResponse = serde_json::from_str(body).ok()?;
    Some(match response.error.status {
        Some(status) => format!("{}: {}", status, response.error.message),
        None => response.error.message,
    })
}
