use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::provider_from_config;
use crate::indexer::{DocumentSource, IndexReport, Indexer};
use crate::retrieval::{RetrievalOptions, Retriever, SimilarityResult};
use crate::store::store_from_config;

/// Directory scanned by `index` when none is given
pub const DEFAULT_DOCUMENTS_DIR: &str = "./resources";
/// Query used by `query` when no text is given
pub const DEFAULT_QUERY: &str = "Transfer completed but payment has not arrived";

/// Command-line adjustments to the configured retrieval settings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryOverrides {
    pub threshold: Option<f32>,
    pub candidate_limit: Option<usize>,
    pub top_k: Option<usize>,
}

impl QueryOverrides {
    /// Apply the overrides on top of `config`, validating each value
    #[inline]
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(threshold) = self.threshold {
            config.retrieval.set_threshold(threshold)?;
        }
        if let Some(limit) = self.candidate_limit {
            config.retrieval.set_candidate_limit(limit)?;
        }
        if let Some(top_k) = self.top_k {
            anyhow::ensure!(top_k > 0, "--top-k must be at least 1");
            config.retrieval.top_k = Some(top_k);
        }
        Ok(())
    }
}

/// Embed every document in `dir` and store the results
#[inline]
pub async fn index_directory(config_dir: &Path, dir: &Path) -> Result<IndexReport> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    let documents = DocumentSource::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read documents from {}", dir.display()))?;

    let provider = provider_from_config(&config.provider)?;
    let store = store_from_config(&config)
        .await
        .context("Failed to open vector store")?;

    let report = Indexer::new(provider, store)
        .with_concurrency(config.provider.concurrency)
        .with_progress(progress_bar())
        .index(documents)
        .await
        .context("Failed to index documents")?;

    Ok(report)
}

/// `index` command: index a directory and print a summary
#[inline]
pub async fn run_index(config_dir: &Path, dir: &Path) -> Result<()> {
    info!("Indexing documents from {}", dir.display());

    let report = index_directory(config_dir, dir).await?;

    for failure in &report.failures {
        println!("Skipped {}: {}", failure.source, failure.error);
    }

    if report.nothing_indexed() {
        println!("Nothing to index");
        if report.attempted > 0 {
            warn!("All {} documents failed to embed", report.attempted);
        }
    } else {
        println!(
            "Indexed {} of {} documents",
            report.inserted, report.attempted
        );
    }

    Ok(())
}

/// Run a similarity query against the configured store
#[inline]
pub async fn search(
    config_dir: &Path,
    text: &str,
    overrides: &QueryOverrides,
) -> Result<Vec<SimilarityResult>> {
    let mut config = Config::load(config_dir).context("Failed to load configuration")?;
    overrides.apply(&mut config)?;

    let provider = provider_from_config(&config.provider)?;
    let store = store_from_config(&config)
        .await
        .context("Failed to open vector store")?;

    let results = Retriever::new(provider, store)
        .with_options(RetrievalOptions::from(&config.retrieval))
        .with_candidate_limit(config.retrieval.candidate_limit)
        .query(text)
        .await
        .context("Query failed")?;

    Ok(results)
}

/// `query` command: print matching documents as JSON on stdout
#[inline]
pub async fn run_query(config_dir: &Path, text: &str, overrides: &QueryOverrides) -> Result<()> {
    let results = search(config_dir, text, overrides).await?;
    println!("{}", render_results(&results)?);
    Ok(())
}

/// Pretty JSON array of `{id, content, metadata, similarity}` objects
#[inline]
pub fn render_results(results: &[SimilarityResult]) -> Result<String> {
    serde_json::to_string_pretty(results).context("Failed to serialize results")
}

fn progress_bar() -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}
