//! LanceDB-backed store: one table per index, upserts through `merge_insert`
//! on `id`, vector search with an optional SQL pre-filter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use serde_json::Value;
use tracing::{debug, info, warn};

use docrag_core::metadata::{document_id_of, index_of, CHUNK_INDEX, DOCUMENT_ID, NODE_INDEX, NODE_INFO};
use docrag_core::{Condition, IndexSpec, Metadata, MetadataFilter, Metric, ProvisioningError, ScoredMatch, StoreError, VectorRecord, VectorStore};

use crate::schema::build_record_schema;
use crate::table::{ensure_record_table, open_db, TableState};

const FILTERABLE: [&str; 3] = [DOCUMENT_ID, NODE_INDEX, CHUNK_INDEX];

pub struct LanceDbStore {
    db: Connection,
    spec: IndexSpec,
    timeout: Duration,
}

impl LanceDbStore {
    pub async fn connect(uri: &str, spec: IndexSpec, timeout: Duration) -> Result<Self, StoreError> {
        let db = open_db(uri).await.map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db, spec, timeout })
    }

    fn dimension(&self) -> Result<i32, StoreError> {
        i32::try_from(self.spec.dimension).map_err(|_| StoreError::Backend(format!("dimension {} is too large", self.spec.dimension)))
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = lancedb::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| StoreError::Backend(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    fn distance_type(&self) -> DistanceType {
        match self.spec.metric {
            Metric::Cosine => DistanceType::Cosine,
            Metric::Euclidean => DistanceType::L2,
            Metric::Dotproduct => DistanceType::Dot,
        }
    }

    fn score(&self, distance: f32) -> f32 {
        match self.spec.metric {
            Metric::Cosine | Metric::Dotproduct => 1.0 - distance,
            Metric::Euclidean => 1.0 / (1.0 + distance.max(0.0).sqrt()),
        }
    }

    fn records_to_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch, StoreError> {
        let dim = self.dimension()?;
        let schema = build_record_schema(dim);
        let mut ids = Vec::new(); let mut doc_ids = Vec::new(); let mut node_indices = Vec::new(); let mut chunk_indices = Vec::new(); let mut metas = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
        for r in records {
            if r.vector.len() != self.spec.dimension {
                return Err(StoreError::Dimension { expected: self.spec.dimension, actual: r.vector.len() });
            }
            ids.push(r.id.clone());
            doc_ids.push(document_id_of(&r.metadata).map(str::to_string));
            node_indices.push(index_of(&r.metadata, NODE_INDEX).map(|n| n as i64));
            chunk_indices.push(index_of(&r.metadata, CHUNK_INDEX).map(|n| n as i64));
            metas.push(Value::Object(r.metadata.clone()).to_string());
            vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(schema, vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(Int64Array::from(node_indices)),
            Arc::new(Int64Array::from(chunk_indices)),
            Arc::new(StringArray::from(metas)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
        ])
        .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl VectorStore for LanceDbStore {
    fn spec(&self) -> &IndexSpec { &self.spec }

    async fn ensure_index(&self) -> Result<(), ProvisioningError> {
        let dim = self.dimension().map_err(|e| ProvisioningError::new(&self.spec.name, e))?;
        let state = match tokio::time::timeout(self.timeout, ensure_record_table(&self.db, &self.spec.name, dim)).await {
            Ok(result) => result.map_err(|e| ProvisioningError::new(&self.spec.name, e))?,
            Err(_) => return Err(ProvisioningError::new(&self.spec.name, format!("timed out after {:?}", self.timeout))),
        };
        match state {
            TableState::Created => info!(index = %self.spec.name, dimension = dim, "created LanceDB table"),
            TableState::Existing => debug!(index = %self.spec.name, "LanceDB table already exists"),
        }
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        if records.is_empty() { return Ok(()); }
        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let table = self.bounded(self.db.open_table(&self.spec.name).execute()).await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        let _ = self.bounded(mi.execute(reader)).await?;
        debug!(index = %self.spec.name, records = records.len(), "upserted into LanceDB");
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<ScoredMatch>, StoreError> {
        if vector.len() != self.spec.dimension {
            return Err(StoreError::Dimension { expected: self.spec.dimension, actual: vector.len() });
        }
        let predicate = match filter { Some(f) if !f.is_empty() => Some(sql_predicate(f)?), _ => None };
        let table = self.bounded(self.db.open_table(&self.spec.name).execute()).await?;
        let mut q = table
            .vector_search(vector.to_vec())
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .distance_type(self.distance_type())
            .limit(top_k);
        if let Some(sql) = predicate { q = q.only_if(sql); }
        let mut stream = self.bounded(q.execute()).await?;

        let mut matches = Vec::new();
        while let Some(batch) = self.bounded(stream.try_next()).await? {
            let ids = string_column(&batch, "id")?;
            let metas = string_column(&batch, "metadata")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| StoreError::Backend("search result has no _distance column".into()))?;
            for i in 0..batch.num_rows() {
                let metadata = metadata_from_column(metas.value(i));
                let score = if distances.is_null(i) { 0.0 } else { self.score(distances.value(i)) };
                matches.push(ScoredMatch { id: ids.value(i).to_string(), score, metadata });
            }
        }
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Backend(format!("search result has no '{}' column", name)))
}

/// Parse the stored `metadata` column. Text that is not a JSON object is kept
/// as the raw `node_info` so the match can still be shown.
pub fn metadata_from_column(raw: &str) -> Metadata {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(m)) => m,
        _ => {
            warn!(raw_chars = raw.chars().count(), "unreadable metadata column");
            let mut m = Metadata::new();
            m.insert(NODE_INFO.to_string(), Value::String(raw.to_string()));
            m
        }
    }
}

/// SQL predicate over the promoted columns. Only `document_id`, `node_index`
/// and `chunk_index` can be filtered on.
pub fn sql_predicate(filter: &MetadataFilter) -> Result<String, StoreError> {
    let mut clauses = Vec::new();
    for (field, condition) in filter.conditions() {
        let column = FILTERABLE
            .iter()
            .find(|c| **c == field.as_str())
            .ok_or_else(|| StoreError::Filter(format!("field '{}' is not filterable; use one of {:?}", field, FILTERABLE)))?;
        let clause = match condition {
            Condition::Eq(v) => format!("{} = {}", column, sql_literal(v)?),
            Condition::Ne(v) => format!("({} IS NULL OR {} <> {})", column, column, sql_literal(v)?),
            Condition::In(values) if values.is_empty() => "FALSE".to_string(),
            Condition::In(values) => {
                let list = values.iter().map(sql_literal).collect::<Result<Vec<_>, _>>()?.join(", ");
                format!("{} IN ({})", column, list)
            }
            Condition::Gt(n) => format!("{} > {}", column, n),
            Condition::Gte(n) => format!("{} >= {}", column, n),
            Condition::Lt(n) => format!("{} < {}", column, n),
            Condition::Lte(n) => format!("{} <= {}", column, n),
        };
        clauses.push(clause);
    }
    Ok(clauses.join(" AND "))
}

fn sql_literal(value: &Value) -> Result<String, StoreError> {
    match value {
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(StoreError::Filter(format!("unsupported filter value {}", other))),
    }
}
