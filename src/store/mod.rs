// Vector store module
// Persisted (content, metadata, embedding) records and nearest-neighbour lookup

pub mod astra;
pub mod lance;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, ConfigError, StoreKind};
use crate::embeddings::Embedding;
use crate::http::HttpError;

pub use astra::AstraStore;
pub use lance::LanceStore;

/// Free-form annotations kept alongside a document, e.g. its file name
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A piece of text to index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    #[inline]
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Human-readable name for logs: the `filename` metadata entry when present
    #[inline]
    pub fn label(&self) -> String {
        self.metadata
            .get("filename")
            .and_then(|value| value.as_str())
            .map_or_else(
                || format!("document ({} bytes)", self.content.len()),
                str::to_string,
            )
    }
}

/// A document paired with its embedding, ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub document: Document,
    pub embedding: Embedding,
}

/// A record read back from the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    #[serde(skip)]
    pub embedding: Option<Embedding>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to {operation} failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: HttpError,
    },
    #[error("{operation} was rejected: {detail}")]
    Api {
        operation: &'static str,
        detail: String,
    },
    #[error("record {index} has {actual} dimensions, the store expects {expected}")]
    Dimension {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("schema error: {0}")]
    Schema(String),
    #[error("database error: {0}")]
    Database(String),
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist `records`, assigning each a fresh identifier; returns the number inserted
    async fn insert_many(&self, records: Vec<NewRecord>) -> Result<usize, StoreError>;

    /// Up to `limit` records in the store's own nearest-first order
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError>;
}

/// Open the store selected in the configuration
#[inline]
pub async fn store_from_config(config: &Config) -> crate::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.store.kind {
        StoreKind::Astra => Arc::new(AstraStore::new(&config.store)?),
        StoreKind::Lancedb => Arc::new(
            LanceStore::open(
                &config.vector_database_path(),
                config.store.collection_name(),
                config.provider.dimension as usize,
            )
            .await?,
        ),
    };
    Ok(store)
}

pub(crate) fn missing(key: &'static str, env: &'static str) -> ConfigError {
    ConfigError::MissingSetting { key, env }
}
