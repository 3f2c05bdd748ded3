// Indexer module
// Turns a set of documents into stored embeddings, tolerating per-document failures


use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::settings::DEFAULT_EMBEDDING_CONCURRENCY;
use crate::embeddings::{EmbeddingProvider, ProviderError};
use crate::store::{Document, Metadata, NewRecord, VectorStore};

/// Loads the documents to index from disk
pub struct DocumentSource;

impl DocumentSource {
    /// Read every regular file directly inside `dir` as a document
    ///
    /// Files are returned sorted by name. Files that cannot be read as UTF-8 text are logged and
    /// skipped; subdirectories are ignored. Each document carries `{"filename": <name>}` metadata.
    ///
    /// # Errors
    /// Fails when `dir` itself cannot be listed.
    #[inline]
    pub async fn read_dir(dir: &Path) -> crate::Result<Vec<Document>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                debug!("Skipping non-file entry: {}", entry.path().display());
                continue;
            }
            files.push(entry);
        }

        files.sort_by_key(|entry| entry.file_name());

        let mut documents = Vec::with_capacity(files.len());
        for entry in files {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping unreadable file {}: {}", path.display(), e);
                    continue;
                }
            };

            let content = match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(_) => {
                    warn!("Skipping {}: not valid UTF-8 text", path.display());
                    continue;
                }
            };

            let mut metadata = Metadata::new();
            metadata.insert("filename".to_string(), Value::String(name));
            documents.push(Document::new(content, metadata));
        }

        info!(
            "Loaded {} documents from {}",
            documents.len(),
            dir.display()
        );
        Ok(documents)
    }
}

/// A document that could not be embedded
#[derive(Debug)]
pub struct IndexFailure {
    /// Label of the document, usually its file name
    pub source: String,
    pub error: ProviderError,
}

/// Outcome of one indexing run
#[derive(Debug, Default)]
pub struct IndexReport {
    pub attempted: usize,
    pub inserted: usize,
    pub failures: Vec<IndexFailure>,
}

impl IndexReport {
    /// True when no document made it into the store
    #[inline]
    pub fn nothing_indexed(&self) -> bool {
        self.inserted == 0
    }
}

/// Embeds documents and writes the successes to a vector store in one batch
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    concurrency: usize,
    progress: ProgressBar,
}

impl Indexer {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            provider,
            store,
            concurrency: DEFAULT_EMBEDDING_CONCURRENCY,
            progress: ProgressBar::hidden(),
        }
    }

    /// Maximum number of embedding requests in flight
    #[inline]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Report per-document progress on `progress`
    #[inline]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Embed each document and insert the ones that succeeded
    ///
    /// Embedding failures are logged and collected in the report; they never abort the run.
    /// The store is not called when no document could be embedded.
    ///
    /// # Errors
    /// Returns the store error if the batch insert fails.
    #[inline]
    pub async fn index(&self, documents: Vec<Document>) -> crate::Result<IndexReport> {
        let attempted = documents.len();
        info!(
            "Embedding {} documents with {} (concurrency {})",
            attempted,
            self.provider.name(),
            self.concurrency
        );

        self.progress.set_length(attempted as u64);
        self.progress.set_position(0);

        let outcomes: Vec<(Document, Result<_, ProviderError>)> = stream::iter(documents)
            .map(|document| {
                let provider = Arc::clone(&self.provider);
                let progress = self.progress.clone();
                async move {
                    progress.set_message(document.label());
                    let result = provider.embed(&document.content).await;
                    progress.inc(1);
                    (document, result)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (document, result) in outcomes {
            match result {
                Ok(embedding) => {
                    debug!("Embedded {}", document.label());
                    records.push(NewRecord {
                        document,
                        embedding,
                    });
                }
                Err(error) => {
                    warn!("Failed to embed {}: {}", document.label(), error);
                    failures.push(IndexFailure {
                        source: document.label(),
                        error,
                    });
                }
            }
        }

        self.progress.finish_and_clear();

        if records.is_empty() {
            info!("Nothing to index");
            return Ok(IndexReport {
                attempted,
                inserted: 0,
                failures,
            });
        }

        let inserted = self.store.insert_many(records).await?;
        info!(
            "Indexed {} of {} documents ({} failed)",
            inserted,
            attempted,
            failures.len()
        );

        Ok(IndexReport {
            attempted,
            inserted,
            failures,
        })
    }
}
