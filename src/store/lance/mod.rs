// LanceDB vector store
// Embedded, file-backed table used when no remote store is configured


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Metadata, NewRecord, StoreError, StoredRecord, VectorStore};

/// LanceDB table holding one row per indexed document
pub struct LanceStore {
    table: Table,
    table_name: String,
    vector_dimension: usize,
}

impl LanceStore {
    /// Open (creating if needed) the table `table_name` under `db_path`
    ///
    /// # Arguments
    /// * `db_path` - Directory holding the LanceDB data
    /// * `table_name` - Table to read and write
    /// * `vector_dimension` - Length of every stored embedding
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - Opened store, or a schema error when an existing table
    ///   was created with a different dimension
    #[inline]
    pub async fn open(
        db_path: &Path,
        table_name: &str,
        vector_dimension: usize,
    ) -> Result<Self, StoreError> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            StoreError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.iter().any(|name| name == table_name) {
            let table = connection
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to open table: {}", e)))?;

            let existing = detect_vector_dimension(&table).await?;
            if existing != vector_dimension {
                return Err(StoreError::Schema(format!(
                    "table '{}' stores {}-dimensional vectors but {} were configured",
                    table_name, existing, vector_dimension
                )));
            }
            debug!("Opened existing table '{}'", table_name);
            table
        } else {
            info!(
                "Creating table '{}' with {} dimensions",
                table_name, vector_dimension
            );
            connection
                .create_empty_table(table_name, create_schema(vector_dimension))
                .execute()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to create table: {}", e)))?
        };

        Ok(Self {
            table,
            table_name: table_name.to_string(),
            vector_dimension,
        })
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Get the total number of stored records
    #[inline]
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Create a RecordBatch from new records, assigning identifiers
    fn create_record_batch(&self, records: &[NewRecord]) -> Result<RecordBatch, StoreError> {
        let len = records.len();
        let created_at = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.vector_dimension);
        let mut contents = Vec::with_capacity(len);
        let mut metadata = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for (index, record) in records.iter().enumerate() {
            if record.embedding.len() != self.vector_dimension {
                return Err(StoreError::Dimension {
                    index,
                    expected: self.vector_dimension,
                    actual: record.embedding.len(),
                });
            }

            ids.push(Uuid::new_v4().to_string());
            flat_values.extend_from_slice(&record.embedding);
            contents.push(record.document.content.as_str());
            metadata.push(serde_json::to_string(&record.document.metadata).map_err(|e| {
                StoreError::Database(format!("Failed to encode metadata: {}", e))
            })?);
            created_ats.push(created_at.as_str());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.vector_dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| StoreError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(self.vector_dimension), arrays)
            .map_err(|e| StoreError::Database(format!("Failed to create record batch: {}", e)))
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn insert_many(&self, records: Vec<NewRecord>) -> Result<usize, StoreError> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(0);
        }

        debug!("Storing batch of {} records", records.len());

        let record_batch = self.create_record_batch(&records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to insert records: {}", e)))?;

        info!("Successfully stored {} records", records.len());
        Ok(records.len())
    }

    async fn nearest_neighbors(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.vector_dimension {
            return Err(StoreError::Schema(format!(
                "query has {} dimensions, table '{}' stores {}",
                query.len(),
                self.table_name,
                self.vector_dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let mut results = self
            .table
            .vector_search(query)
            .map_err(|e| StoreError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to execute search: {}", e)))?;

        let mut records = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to read result stream: {}", e)))?
        {
            records.extend(parse_batch(&batch)?);
        }

        debug!("Parsed {} search results", records.len());
        Ok(records)
    }
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize, StoreError> {
    let schema = table
        .schema()
        .await
        .map_err(|e| StoreError::Database(format!("Failed to get table schema: {}", e)))?;

    let field = schema
        .field_with_name("vector")
        .map_err(|_| StoreError::Schema("table has no vector column".to_string()))?;

    match field.data_type() {
        DataType::FixedSizeList(_, size) => Ok(*size as usize),
        other => Err(StoreError::Schema(format!(
            "vector column has unexpected type {}",
            other
        ))),
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::Schema(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StoreError::Schema(format!("Invalid {} column type", name)))
}

/// Parse a single record batch from search results
fn parse_batch(batch: &RecordBatch) -> Result<Vec<StoredRecord>, StoreError> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let metadata = string_column(batch, "metadata")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|col| col.as_any().downcast_ref::<FixedSizeListArray>());

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let metadata: Metadata = serde_json::from_str(metadata.value(row)).map_err(|e| {
            StoreError::Database(format!(
                "Invalid metadata for record {}: {}",
                ids.value(row),
                e
            ))
        })?;

        let embedding = vectors.filter(|v| !v.is_null(row)).and_then(|v| {
            v.value(row)
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(|values| values.values().to_vec())
        });

        records.push(StoredRecord {
            id: ids.value(row).to_string(),
            content: contents.value(row).to_string(),
            metadata,
            embedding,
        });
    }

    Ok(records)
}
