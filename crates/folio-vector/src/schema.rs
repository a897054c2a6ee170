use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const ENTRIES_TABLE: &str = "entries";
pub const META_TABLE: &str = "meta";

/// One row per index entry; `ordinal` restores insertion order on load.
pub fn build_entries_schema(dim: usize) -> Arc<Schema> {
    let dim = i32::try_from(dim).unwrap_or(i32::MAX);
    Arc::new(Schema::new(vec![
        Field::new("ordinal", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int64, false),
        Field::new("project_name", DataType::Utf8, true),
        Field::new("chunk_kind", DataType::Utf8, false),
        Field::new("headings", DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))), false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

/// Key/value metadata describing how the entries were produced.
pub fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}
