use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Chunk table layout. `vector` is null until an embedding is attached.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("doc_path", DataType::Utf8, false),
        Field::new("ordinal", DataType::Int32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            true,
        ),
    ]))
}
