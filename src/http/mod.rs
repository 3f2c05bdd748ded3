// Shared JSON-over-HTTP transport for the embedding providers and the remote vector store


use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl HttpError {
    /// Whether another attempt could succeed
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Encode(_) | Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Blocking `ureq` agent driven from async code, posting JSON and decoding JSON replies
#[derive(Debug, Clone)]
pub struct JsonClient {
    agent: ureq::Agent,
    headers: Vec<(String, String)>,
    retry_attempts: u32,
    backoff: Duration,
}

impl Default for JsonClient {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl JsonClient {
    #[inline]
    pub fn new() -> Self {
        Self {
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            headers: Vec::new(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; doubles on every further attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Add a header sent with every request
    #[inline]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// POST `body` as JSON to `url` and decode the JSON reply
    #[inline]
    pub async fn post_json<B, R>(&self, url: &Url, body: &B) -> Result<R, HttpError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_string(body).map_err(|e| HttpError::Encode(e.to_string()))?;
        let response_text = self.post_with_retry(url, payload).await?;

        serde_json::from_str(&response_text).map_err(|e| HttpError::Decode(e.to_string()))
    }

    async fn post_with_retry(&self, url: &Url, payload: String) -> Result<String, HttpError> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{} to {}", attempt, self.retry_attempts, url);

            match self.post_once(url, payload.clone()).await {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        "Retryable error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(error);

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(error) => {
                    warn!("Non-retryable error: {}", error);
                    return Err(error);
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);

        Err(last_error
            .unwrap_or_else(|| HttpError::Transport("request failed after retries".to_string())))
    }

    async fn post_once(&self, url: &Url, payload: String) -> Result<String, HttpError> {
        let agent = self.agent.clone();
        let headers = self.headers.clone();
        let target = url.to_string();

        let (status, body) = tokio::task::spawn_blocking(move || {
            let mut request = agent
                .post(target.as_str())
                .header("Content-Type", "application/json");
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let mut response = request.send(payload.as_str())?;
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string()?;
            Ok::<_, ureq::Error>((status, body))
        })
        .await
        .map_err(|e| HttpError::Transport(format!("request task failed: {}", e)))?
        .map_err(|e| HttpError::Transport(e.to_string()))?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(HttpError::Status { status, body })
        }
    }
}

/// Append path segments to `base`, keeping any path it already has
#[inline]
pub fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, HttpError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| HttpError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}
