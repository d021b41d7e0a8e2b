//! LanceDB-backed vector store.
//!
//! Records are stored in a single `chunks` table with a fixed-size
//! embedding column; nearest-neighbor queries use cosine distance, which
//! LanceDB reports in the `_distance` result column.
//!
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use crate::error::RagError;

use super::vector::{StoredHit, StoredRecord, VectorStore};

/// Chunk table name.
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// Persistent vector store over a LanceDB dataset.
///
/// The store is bound to one embedding dimension at open time; records
/// with a different vector length are rejected before they reach the
/// backend.
pub struct LanceVectorStore {
    db: Connection,
    dimension: usize,
}

impl LanceVectorStore {
    /// Open (or create) a store at `path` for vectors of `dimension`.
    pub async fn open(path: &Path, dimension: usize) -> Result<Self, RagError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RagError::Store(format!("failed to create store directory: {e}"))
                })?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::Store("invalid path encoding".into()))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("failed to connect to LanceDB: {e}")))?;

        Ok(Self { db, dimension })
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("total_chunks", DataType::Int32, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// Encode records as one Arrow RecordBatch.
    fn records_to_batch(&self, records: &[StoredRecord]) -> Result<RecordBatch, RagError> {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        let sources: Vec<&str> = records.iter().map(|r| r.source.as_str()).collect();
        let chunk_indices: Vec<i32> = records.iter().map(|r| r.chunk_index as i32).collect();
        let totals: Vec<i32> = records.iter().map(|r| r.total_chunks as i32).collect();

        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();
        let values = Float32Array::from(flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| RagError::Store(format!("failed to encode embeddings: {e}")))?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(Int32Array::from(totals)),
                Arc::new(embeddings),
            ],
        )
        .map_err(|e| RagError::Store(format!("failed to build record batch: {e}")))
    }

    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table, RagError> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("failed to open table: {e}")))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn add(&self, records: &[StoredRecord]) -> Result<usize, RagError> {
        if records.is_empty() {
            return Ok(0);
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(RagError::Store(format!(
                "record {} has vector length {}, store dimension is {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            )));
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;
            table
                .add(batches)
                .execute()
                .await
                .map_err(|e| RagError::Store(format!("failed to add records: {e}")))?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .map_err(|e| RagError::Store(format!("failed to create table: {e}")))?;
        }

        tracing::debug!(records = records.len(), "stored records in LanceDB");
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<StoredHit>, RagError> {
        if vector.len() != self.dimension {
            return Err(RagError::Store(format!(
                "query vector length {} does not match store dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        // Empty collection is a valid, empty answer.
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let mut query = table
            .vector_search(vector.to_vec())
            .map_err(|e| RagError::Store(format!("failed to build vector query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(k);

        if let Some(source) = source_filter {
            // Single quotes are doubled for the SQL-like predicate.
            let escaped = source.replace('\'', "''");
            query = query.only_if(format!("source = '{escaped}'"));
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("vector query failed: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::Store(format!("failed to collect query results: {e}")))?;

        let mut hits = Vec::new();
        for batch in batches {
            let contents = string_column(&batch, "content")?;
            let sources = string_column(&batch, "source")?;
            let chunk_indices = int_column(&batch, "chunk_index")?;
            let totals = int_column(&batch, "total_chunks")?;

            // LanceDB appends the `_distance` column to search results.
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| RagError::Store("missing _distance column".into()))?;

            for i in 0..batch.num_rows() {
                hits.push(StoredHit {
                    content: contents.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    chunk_index: chunk_indices.value(i).max(0) as usize,
                    total_chunks: totals.value(i).max(1) as usize,
                    distance: distances.value(i),
                });
            }
        }

        Ok(hits)
    }

    async fn count(&self) -> Result<usize, RagError> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(format!("failed to count rows: {e}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Column Helpers
// ============================================================================

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::Store(format!("missing {name} column")))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array, RagError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| RagError::Store(format!("missing {name} column")))
}

// ============================================================================
// Tests
// ============================================================================
