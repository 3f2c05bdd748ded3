use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Embedding provider error: {0}")]
    Provider(#[from] embeddings::ProviderError),

    #[error("Vector store error: {0}")]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    DimensionMismatch(#[from] retrieval::DimensionMismatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod http;
pub mod indexer;
pub mod retrieval;
pub mod store;
