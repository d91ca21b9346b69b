//! LanceDB connection and table provisioning helpers.

use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection};

use crate::schema::{build_record_schema, vector_width};

pub async fn open_db(uri: &str) -> lancedb::Result<Connection> {
    connect(uri).execute().await
}

#[derive(Debug, PartialEq, Eq)]
pub enum TableState {
    Created,
    Existing,
}

/// Create the table with an empty record schema unless it exists. An existing
/// table must have a vector column of exactly `dimension` floats.
pub async fn ensure_record_table(conn: &Connection, name: &str, dimension: i32) -> Result<TableState, String> {
    let names = conn.table_names().execute().await.map_err(|e| e.to_string())?;
    if names.iter().any(|n| n == name) {
        let table = conn.open_table(name).execute().await.map_err(|e| e.to_string())?;
        let schema = table.schema().await.map_err(|e| e.to_string())?;
        return match vector_width(&schema) {
            Some(width) if width == dimension => Ok(TableState::Existing),
            Some(width) => Err(format!("existing table has vector width {}, expected {}", width, dimension)),
            None => Err("existing table has no fixed-size vector column".to_string()),
        };
    }
    // create empty table with 0 rows
    let schema = build_record_schema(dimension);
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(|e| e.to_string())?;
    Ok(TableState::Created)
}
