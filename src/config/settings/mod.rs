
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const APP_DIR_NAME: &str = "docs-retriever";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 4;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

const GEMINI_DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const GEMINI_DEFAULT_MODEL: &str = "gemini-embedding-001";
const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_KEYSPACE: &str = "default_keyspace";
const DEFAULT_LANCEDB_TABLE: &str = "documents";

pub const ENV_PROVIDER_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_STORE_TOKEN: &str = "ASTRA_DB_APPLICATION_TOKEN";
pub const ENV_STORE_ENDPOINT: &str = "ASTRA_DB_ENDPOINT";
pub const ENV_STORE_COLLECTION: &str = "ASTRA_DB_COLLECTION_NAME";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Astra,
    Lancedb,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub dimension: u32,
    pub concurrency: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            endpoint: None,
            model: None,
            api_key: None,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            concurrency: DEFAULT_EMBEDDING_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub keyspace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            endpoint: None,
            token: None,
            keyspace: DEFAULT_KEYSPACE.to_string(),
            collection: None,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub threshold: f32,
    pub candidate_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            top_k: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Missing required setting `{key}` (set it in config.toml or via {env})")]
    MissingSetting {
        key: &'static str,
        env: &'static str,
    },
    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(&'static str, String),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid embedding concurrency: {0} (must be between 1 and 32)")]
    InvalidConcurrency(usize),
    #[error("Invalid {0}: {1:?} (letters, digits and underscores only, at most 48 characters)")]
    InvalidIdentifier(&'static str, String),
    #[error("Invalid similarity threshold: {0} (must be between -1 and 1)")]
    InvalidThreshold(f32),
    #[error("Invalid candidate limit: {0} (must be between 1 and 100)")]
    InvalidCandidateLimit(usize),
    #[error("Invalid top-k: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Platform configuration directory for this application
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Read and validate the configuration, applying environment overrides
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config = Self::read(config_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration without validating it
    ///
    /// A missing file yields the defaults. Environment variables take precedence over the file.
    #[inline]
    pub fn read<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(config_dir)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read only the settings file, ignoring the environment
    #[inline]
    pub fn read_file<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;
        config.base_dir = config_dir.to_path_buf();

        Ok(config)
    }

    /// Overlay the well-known environment variables onto the file settings
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api_key) = lookup(ENV_PROVIDER_API_KEY) {
            self.provider.api_key = Some(api_key);
        }
        if let Some(token) = lookup(ENV_STORE_TOKEN) {
            self.store.token = Some(token);
        }
        if let Some(endpoint) = lookup(ENV_STORE_ENDPOINT) {
            self.store.endpoint = Some(endpoint);
        }
        if let Some(collection) = lookup(ENV_STORE_COLLECTION) {
            self.store.collection = Some(collection);
        }
    }

    #[inline]
    pub fn save(&self) -> Result<(), ConfigError> {
        self.validate()?;

        fs::create_dir_all(self.get_base_dir())?;

        let content = toml::to_string_pretty(self)?;
        fs::write(self.config_file_path(), content)?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Directory holding the local LanceDB tables
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("vectors"))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.validate()?;
        self.store.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }
}

impl ProviderConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.model_name().trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model_name().to_string()));
        }

        if self.kind == ProviderKind::Gemini && is_blank(self.api_key.as_deref()) {
            return Err(ConfigError::MissingSetting {
                key: "provider.api_key",
                env: ENV_PROVIDER_API_KEY,
            });
        }

        if !(1..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(1..=32).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }

        Ok(())
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let endpoint = self.endpoint.as_deref().unwrap_or(match self.kind {
            ProviderKind::Gemini => GEMINI_DEFAULT_ENDPOINT,
            ProviderKind::Ollama => OLLAMA_DEFAULT_ENDPOINT,
        });
        parse_http_url("provider.endpoint", endpoint)
    }

    #[inline]
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.kind {
            ProviderKind::Gemini => GEMINI_DEFAULT_MODEL,
            ProviderKind::Ollama => OLLAMA_DEFAULT_MODEL,
        })
    }

    #[inline]
    pub fn set_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(1..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }
}

impl StoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            StoreKind::Astra => {
                let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty())
                else {
                    return Err(ConfigError::MissingSetting {
                        key: "store.endpoint",
                        env: ENV_STORE_ENDPOINT,
                    });
                };
                parse_http_url("store.endpoint", endpoint)?;

                if is_blank(self.token.as_deref()) {
                    return Err(ConfigError::MissingSetting {
                        key: "store.token",
                        env: ENV_STORE_TOKEN,
                    });
                }

                let Some(collection) = self.collection.as_deref() else {
                    return Err(ConfigError::MissingSetting {
                        key: "store.collection",
                        env: ENV_STORE_COLLECTION,
                    });
                };
                validate_identifier("store.collection", collection)?;
                validate_identifier("store.keyspace", &self.keyspace)?;
            }
            StoreKind::Lancedb => {
                validate_identifier("store.collection", self.collection_name())?;
            }
        }

        Ok(())
    }

    /// Collection (Astra) or table (LanceDB) name
    #[inline]
    pub fn collection_name(&self) -> &str {
        self.collection.as_deref().unwrap_or(DEFAULT_LANCEDB_TABLE)
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let endpoint = self.endpoint.as_deref().ok_or(ConfigError::MissingSetting {
            key: "store.endpoint",
            env: ENV_STORE_ENDPOINT,
        })?;
        parse_http_url("store.endpoint", endpoint)
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }

        if !(1..=100).contains(&self.candidate_limit) {
            return Err(ConfigError::InvalidCandidateLimit(self.candidate_limit));
        }

        if self.top_k == Some(0) {
            return Err(ConfigError::InvalidTopK(0));
        }

        Ok(())
    }

    #[inline]
    pub fn set_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        self.threshold = threshold;
        Ok(())
    }

    #[inline]
    pub fn set_candidate_limit(&mut self, limit: usize) -> Result<(), ConfigError> {
        if !(1..=100).contains(&limit) {
            return Err(ConfigError::InvalidCandidateLimit(limit));
        }
        self.candidate_limit = limit;
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn parse_http_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl(key, value.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(key, value.to_string()));
    }
    Ok(url)
}

fn validate_identifier(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = !value.is_empty()
        && value.len() <= 48
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(key, value.to_string()))
    }
}
