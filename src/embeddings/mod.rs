// Embeddings module
// Remote embedding providers behind a common async trait

pub mod gemini;
pub mod ollama;


use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, ProviderConfig, ProviderKind};
use crate::http::HttpError;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// Fixed-length vector representing the meaning of a text
pub type Embedding = Vec<f32>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: HttpError,
    },
    #[error("{provider} rejected the request (HTTP {status}): {detail}")]
    Rejected {
        provider: &'static str,
        status: u16,
        detail: String,
    },
    #[error("{provider} returned no embedding")]
    EmptyResponse { provider: &'static str },
    #[error("{provider} returned a {actual}-dimensional embedding, expected {expected}")]
    UnexpectedDimension {
        provider: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl ProviderError {
    /// Classify a transport failure, pulling the provider's own message out of error bodies
    pub(crate) fn from_http<F>(provider: &'static str, error: HttpError, detail: F) -> Self
    where
        F: FnOnce(&str) -> Option<String>,
    {
        match error {
            HttpError::Status { status, body } => Self::Rejected {
                provider,
                status,
                detail: detail(&body).unwrap_or(body),
            },
            source => Self::Request { provider, source },
        }
    }
}

/// Source of embeddings for documents and queries
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and errors
    fn name(&self) -> &'static str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError>;
}

/// Build the provider selected in the configuration
#[inline]
pub fn provider_from_config(
    config: &ProviderConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    Ok(match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiClient::new(config)?),
        ProviderKind::Ollama => Arc::new(OllamaClient::new(config)?),
    })
}

pub(crate) fn check_dimension(
    provider: &'static str,
    expected: usize,
    embedding: Embedding,
) -> Result<Embedding, ProviderError> {
    if embedding.is_empty() {
        return Err(ProviderError::EmptyResponse { provider });
    }
    if embedding.len() != expected {
        return Err(ProviderError::UnexpectedDimension {
            provider,
            expected,
            actual: embedding.len(),
        });
    }
    Ok(embedding)
}
