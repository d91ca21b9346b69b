use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Table layout for one index: routing fields promoted to columns so they can
/// be filtered in SQL, the full metadata map as JSON text, and the vector.
pub fn build_record_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, true),
        Field::new("node_index", DataType::Int64, true),
        Field::new("chunk_index", DataType::Int64, true),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension), true),
    ]))
}

/// Width of the `vector` column, if the schema has one.
pub fn vector_width(schema: &Schema) -> Option<i32> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, n) => Some(*n),
        _ => None,
    }
}
