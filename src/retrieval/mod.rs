// Retrieval module
// Cosine re-scoring of store candidates and the query orchestration around it


use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::config::settings::{DEFAULT_CANDIDATE_LIMIT, DEFAULT_SIMILARITY_THRESHOLD};
use crate::embeddings::EmbeddingProvider;
use crate::store::{StoredRecord, VectorStore};

/// A stored embedding whose length differs from the query's
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {record_id} has a {actual}-dimensional embedding, the query has {expected}")]
pub struct DimensionMismatchError {
    pub record_id: String,
    pub expected: usize,
    pub actual: usize,
}

/// Filtering applied after re-scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    /// Minimum similarity a candidate needs to be kept (inclusive)
    pub threshold: f32,
    /// Keep at most this many results after sorting
    pub top_k: Option<usize>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: None,
        }
    }
}

impl From<&RetrievalConfig> for RetrievalOptions {
    #[inline]
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            threshold: config.threshold,
            top_k: config.top_k,
        }
    }
}

/// A candidate that passed the threshold, with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    #[serde(flatten)]
    pub record: StoredRecord,
    pub similarity: f32,
}

/// Cosine of the angle between `a` and `b`
///
/// Zero when either vector has zero magnitude. Sums are accumulated in `f64`, so a non-zero
/// vector compared with itself yields exactly `1.0`. Vectors of different lengths are compared
/// over their common prefix; callers check lengths first.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0) as f32
}

/// Re-score `candidates` against `query`, keep those at or above the threshold and return them
/// best first
///
/// Candidates without an embedding are skipped. Equal scores keep their candidate order.
///
/// # Errors
/// Returns `DimensionMismatchError` for the first candidate whose embedding length differs from
/// the query length; no partial result is produced.
#[inline]
pub fn retrieve(
    query: &[f32],
    candidates: Vec<StoredRecord>,
    options: &RetrievalOptions,
) -> Result<Vec<SimilarityResult>, DimensionMismatchError> {
    if let Some(record) = candidates.iter().find(|record| {
        record
            .embedding
            .as_ref()
            .is_some_and(|embedding| embedding.len() != query.len())
    }) {
        return Err(DimensionMismatchError {
            record_id: record.id.clone(),
            expected: query.len(),
            actual: record.embedding.as_ref().map_or(0, Vec::len),
        });
    }

    let candidate_count = candidates.len();
    let mut results: Vec<SimilarityResult> = candidates
        .into_iter()
        .filter_map(|record| {
            let similarity = cosine_similarity(query, record.embedding.as_deref()?);
            (similarity >= options.threshold).then_some(SimilarityResult { record, similarity })
        })
        .collect();

    // sort_by is stable, so ties stay in candidate order
    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    if let Some(top_k) = options.top_k {
        results.truncate(top_k);
    }

    debug!(
        "{} of {} candidates passed threshold {}",
        results.len(),
        candidate_count,
        options.threshold
    );

    Ok(results)
}

/// Answers text queries: embed, fetch neighbours, re-score
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    options: RetrievalOptions,
    candidate_limit: usize,
}

impl Retriever {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            provider,
            store,
            options: RetrievalOptions::default(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    #[inline]
    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of nearest neighbours requested from the store before re-scoring
    #[inline]
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    #[inline]
    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    /// Find stored documents similar to `text`
    ///
    /// # Errors
    /// Embedding and store failures are returned as-is, as is a length mismatch between the
    /// query embedding and any candidate.
    #[inline]
    pub async fn query(&self, text: &str) -> crate::Result<Vec<SimilarityResult>> {
        info!("Searching for: {}", text);

        let query = self.provider.embed(text).await?;
        let candidates = self
            .store
            .nearest_neighbors(&query, self.candidate_limit)
            .await?;

        debug!(
            "Store returned {} candidates for a {}-dimensional query",
            candidates.len(),
            query.len()
        );

        let results = retrieve(&query, candidates, &self.options)?;
        info!("Found {} relevant documents", results.len());
        Ok(results)
    }
}
