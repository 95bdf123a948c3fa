use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Columns of the persisted chunk table. `metadata` holds the chunk's
/// metadata map serialized as a JSON object.
pub fn build_chunk_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("page", DataType::UInt32, true),
		Field::new("section_path", DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))), false),
		Field::new("span_start", DataType::UInt64, true),
		Field::new("span_end", DataType::UInt64, true),
		Field::new("metadata", DataType::Utf8, false),
	]))
}
