#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{Metadata, NewRecord, StoreError, StoredRecord, VectorStore, missing};
use crate::config::settings::{ENV_STORE_COLLECTION, ENV_STORE_TOKEN};
use crate::config::{ConfigError, StoreConfig};
use crate::http::{HttpError, JsonClient, join_segments};

const TOKEN_HEADER: &str = "Token";
/// Documents per `insertMany` call; the Data API caps a single call at 100
const DEFAULT_INSERT_CHUNK_SIZE: usize = 50;

/// Collection in an Astra DB database, driven through the JSON Data API
#[derive(Debug, Clone)]
pub struct AstraStore {
    client: JsonClient,
    collection_url: Url,
    insert_chunk_size: usize,
}

#[derive(Debug, Serialize)]
struct InsertManyCommand<'a> {
    #[serde(rename = "insertMany")]
    insert_many: InsertMany<'a>,
}

#[derive(Debug, Serialize)]
struct InsertMany<'a> {
    documents: Vec<AstraDocument<'a>>,
    options: InsertOptions,
}

#[derive(Debug, Serialize)]
struct InsertOptions {
    ordered: bool,
}

#[derive(Debug, Serialize)]
struct AstraDocument<'a> {
    #[serde(rename = "_id")]
    id: String,
    content: &'a str,
    metadata: &'a Metadata,
    #[serde(rename = "$vector")]
    vector: &'a [f32],
}

#[derive(Debug, Serialize)]
struct FindCommand<'a> {
    find: Find<'a>,
}

#[derive(Debug, Serialize)]
struct Find<'a> {
    sort: VectorSort<'a>,
    projection: VectorProjection,
    options: FindOptions,
}

#[derive(Debug, Serialize)]
struct VectorSort<'a> {
    #[serde(rename = "$vector")]
    vector: &'a [f32],
}

/// Ask for `$vector` in results; the Data API omits it by default
#[derive(Debug, Serialize)]
struct VectorProjection {
    #[serde(rename = "$vector")]
    vector: u8,
}

#[derive(Debug, Serialize)]
struct FindOptions {
    limit: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: Option<ApiStatus>,
    #[serde(default)]
    data: Option<FindData>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(rename = "insertedIds", default)]
    inserted_ids: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FindData {
    #[serde(default)]
    documents: Vec<FoundDocument>,
}

#[derive(Debug, Deserialize)]
struct FoundDocument {
    #[serde(rename = "_id")]
    id: Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(rename = "$vector", default)]
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

impl AstraStore {
    #[inline]
    pub fn new(config: &StoreConfig) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint_url()?;
        let token = config
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| missing("store.token", ENV_STORE_TOKEN))?;
        let collection = config
            .collection
            .as_deref()
            .ok_or_else(|| missing("store.collection", ENV_STORE_COLLECTION))?;

        let collection_url = join_segments(
            &endpoint,
            &["api", "json", "v1", &config.keyspace, collection],
        )
        .map_err(|_| ConfigError::InvalidUrl("store.endpoint", endpoint.to_string()))?;

        Ok(Self {
            client: JsonClient::new().with_header(TOKEN_HEADER, token),
            collection_url,
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
        })
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

    #[inline]
    pub fn with_insert_chunk_size(mut self, size: usize) -> Self {
        self.insert_chunk_size = size.clamp(1, 100);
        self
    }

    #[inline]
    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    async fn send<C: Serialize + Sync>(
        &self,
        operation: &'static str,
        command: &C,
    ) -> Result<ApiResponse, StoreError> {
        self.client
            .post_json(&self.collection_url, command)
            .await
            .map_err(|e| from_http(operation, e))
    }
}

#[async_trait]
impl VectorStore for AstraStore {
    async fn insert_many(&self, records: Vec<NewRecord>) -> Result<usize, StoreError> {
        if records.is_empty() {
            debug!("No records to insert");
            return Ok(0);
        }

        info!(
            "Inserting {} documents into {}",
            records.len(),
            self.collection_url
        );

        let mut inserted = 0;
        for chunk in records.chunks(self.insert_chunk_size) {
            let command = InsertManyCommand {
                insert_many: InsertMany {
                    documents: chunk
                        .iter()
                        .map(|record| AstraDocument {
                            id: Uuid::new_v4().to_string(),
                            content: &record.document.content,
                            metadata: &record.document.metadata,
                            vector: &record.embedding,
                        })
                        .collect(),
                    options: InsertOptions { ordered: false },
                },
            };

            let response = self.send("insertMany", &command).await?;
            inserted += response
                .status
                .as_ref()
                .map_or(0, |status| status.inserted_ids.len());

            if !response.errors.is_empty() {
                warn!(
                    "insertMany reported {} errors after {} documents were inserted",
                    response.errors.len(),
                    inserted
                );
                return Err(StoreError::Api {
                    operation: "insertMany",
                    detail: format!(
                        "{} ({} documents inserted before the failure)",
                        describe_errors(&response.errors),
                        inserted
                    ),
                });
            }
        }

        info!("Inserted {} documents", inserted);
        Ok(inserted)
    }

    async fn nearest_neighbors(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let command = FindCommand {
            find: Find {
                sort: VectorSort { vector: query },
                projection: VectorProjection { vector: 1 },
                options: FindOptions { limit },
            },
        };

        let response = self.send("find", &command).await?;
        if !response.errors.is_empty() {
            return Err(StoreError::Api {
                operation: "find",
                detail: describe_errors(&response.errors),
            });
        }

        let records: Vec<StoredRecord> = response
            .data
            .unwrap_or_default()
            .documents
            .into_iter()
            .map(|doc| StoredRecord {
                id: match doc.id {
                    Value::String(id) => id,
                    other => other.to_string(),
                },
                content: doc.content,
                metadata: doc.metadata,
                embedding: doc.vector,
            })
            .collect();

        debug!("Found {} candidate documents", records.len());
        Ok(records)
    }
}

fn from_http(operation: &'static str, error: HttpError) -> StoreError {
    match error {
        HttpError::Status { status, body } => {
            let detail = serde_json::from_str::<ApiResponse>(&body)
                .ok()
                .filter(|response| !response.errors.is_empty())
                .map_or(body, |response| describe_errors(&response.errors));
            StoreError::Api {
                operation,
                detail: format!("HTTP {}: {}", status, detail),
            }
        }
        source => StoreError::Request { operation, source },
    }
}

fn describe_errors(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(|error| match &error.error_code {
            Some(code) => format!("{}: {}", code, error.message),
            None => error.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
