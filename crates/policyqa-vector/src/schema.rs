use arrow_schema::{DataType, Field, Schema};
use std::collections::HashMap;
use std::sync::Arc;

/// Schema-metadata key holding the id of the model that embedded the summaries.
pub const MODEL_METADATA_KEY: &str = "policyqa.model";

pub fn chunk_schema(dim: i32, model: Option<&str>) -> Arc<Schema> {
	let fields = vec![
		Field::new("chunk_id", DataType::Int64, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("chunk_summary", DataType::Utf8, false),
		Field::new("start_offset", DataType::Int64, false),
		Field::new("end_offset", DataType::Int64, false),
		Field::new("page_start", DataType::Int32, false),
		Field::new("page_end", DataType::Int32, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	];
	let metadata: HashMap<String, String> = model.map(|m| (MODEL_METADATA_KEY.to_string(), m.to_string())).into_iter().collect();
	Arc::new(Schema::new(fields).with_metadata(metadata))
}

/// Width of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name("vector").ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}
