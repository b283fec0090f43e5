//! LanceDB-backed chunk store.
//!
//! The table is opened once; chunk metadata is scanned into memory at open
//! time and nearest-neighbour queries go to Lance's cosine vector search.
use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};

use policyqa_core::traits::ChunkStore;
use policyqa_core::types::{Chunk, ChunkId, Corpus, Neighbor};
use policyqa_core::{Error, Result};

use crate::memory::ChunkIndexFile;
use crate::schema::{chunk_schema, vector_dim, MODEL_METADATA_KEY};

fn lance_err(e: lancedb::Error) -> Error {
	match e {
		lancedb::Error::TableNotFound { .. } => Error::NotFound(e.to_string()),
		other => Error::upstream(format!("vector index: {other}")),
	}
}

fn stream_err(e: impl std::fmt::Display) -> Error { Error::upstream(format!("vector index: {e}")) }

async fn open_db(dir: &Path) -> Result<Connection> {
	connect(dir.to_string_lossy().as_ref()).execute().await.map_err(lance_err)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::contract(format!("chunk table column {name} missing or mistyped")))
}

fn to_u32(v: i32, what: &str) -> Result<u32> { u32::try_from(v).map_err(|_| Error::contract(format!("negative {what}: {v}"))) }

fn to_usize(v: i64, what: &str) -> Result<usize> { usize::try_from(v).map_err(|_| Error::contract(format!("negative {what}: {v}"))) }

fn to_i64<T: TryInto<i64>>(v: T) -> Result<i64> { v.try_into().map_err(|_| Error::contract("value does not fit the chunk table")) }

fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let ids = column::<Int64Array>(batch, "chunk_id")?;
	let texts = column::<StringArray>(batch, "text")?;
	let summaries = column::<StringArray>(batch, "chunk_summary")?;
	let starts = column::<Int64Array>(batch, "start_offset")?;
	let ends = column::<Int64Array>(batch, "end_offset")?;
	let page_starts = column::<Int32Array>(batch, "page_start")?;
	let page_ends = column::<Int32Array>(batch, "page_end")?;
	(0..batch.num_rows())
		.map(|i| {
			Ok(Chunk {
				chunk_id: u64::try_from(ids.value(i)).map_err(|_| Error::contract(format!("negative chunk id {}", ids.value(i))))?,
				text: texts.value(i).to_string(),
				chunk_summary: summaries.value(i).to_string(),
				start_offset: to_usize(starts.value(i), "start_offset")?,
				end_offset: to_usize(ends.value(i), "end_offset")?,
				page_start: to_u32(page_starts.value(i), "page_start")?,
				page_end: to_u32(page_ends.value(i), "page_end")?,
			})
		})
		.collect()
}

/// Writes a JSON chunk index into a new Lance table at `dir`.
///
/// Refuses to touch an existing table of the same name.
pub async fn write_chunk_table(dir: &Path, table_name: &str, index: &ChunkIndexFile) -> Result<usize> {
	let db = open_db(dir).await?;
	if db.table_names().execute().await.map_err(lance_err)?.iter().any(|t| t == table_name) {
		return Err(Error::InvalidConfig(format!("table {table_name} already exists in {}", dir.display())));
	}
	let dim = i32::try_from(index.dimension).map_err(|_| Error::InvalidConfig("embedding dimension too large".into()))?;
	let schema = chunk_schema(dim, index.model.as_deref());

	let mut ids = Vec::with_capacity(index.chunks.len());
	let mut texts = Vec::with_capacity(index.chunks.len());
	let mut summaries = Vec::with_capacity(index.chunks.len());
	let mut starts = Vec::with_capacity(index.chunks.len());
	let mut ends = Vec::with_capacity(index.chunks.len());
	let mut page_starts = Vec::with_capacity(index.chunks.len());
	let mut page_ends = Vec::with_capacity(index.chunks.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(index.chunks.len());
	for entry in &index.chunks {
		let c = &entry.chunk;
		if entry.embedding.len() != index.dimension {
			return Err(Error::contract(format!("chunk {} embedding has wrong dimension", c.chunk_id)));
		}
		ids.push(to_i64(c.chunk_id)?);
		texts.push(c.text.clone());
		summaries.push(c.chunk_summary.clone());
		starts.push(to_i64(c.start_offset)?);
		ends.push(to_i64(c.end_offset)?);
		page_starts.push(i32::try_from(c.page_start).map_err(|_| Error::contract("page number too large"))?);
		page_ends.push(i32::try_from(c.page_end).map_err(|_| Error::contract("page number too large"))?);
		vectors.push(Some(entry.embedding.iter().map(|&x| Some(x)).collect()));
	}
	let rows = ids.len();
	let batch = RecordBatch::try_new(
		schema.clone(),
		vec![
			Arc::new(Int64Array::from(ids)),
			Arc::new(StringArray::from(texts)),
			Arc::new(StringArray::from(summaries)),
			Arc::new(Int64Array::from(starts)),
			Arc::new(Int64Array::from(ends)),
			Arc::new(Int32Array::from(page_starts)),
			Arc::new(Int32Array::from(page_ends)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
		],
	)
	.map_err(|e| Error::contract(format!("building chunk batch: {e}")))?;
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	db.create_table(table_name, reader).execute().await.map_err(lance_err)?;
	tracing::info!(table = table_name, rows, dir = %dir.display(), "chunk table written");
	Ok(rows)
}

pub struct LanceChunkStore {
	table: Table,
	corpus: Corpus,
	dim: usize,
	model_id: Option<String>,
}

impl LanceChunkStore {
	pub async fn open(dir: &Path, table_name: &str) -> Result<Self> {
		let db = open_db(dir).await?;
		let table = db.open_table(table_name).execute().await.map_err(lance_err)?;
		let schema = table.schema().await.map_err(lance_err)?;
		let dim = vector_dim(&schema).ok_or_else(|| Error::contract(format!("table {table_name} has no fixed-size vector column")))?;
		let model_id = schema.metadata().get(MODEL_METADATA_KEY).cloned();

		let mut chunks = Vec::new();
		let mut stream = table.query().execute().await.map_err(lance_err)?;
		while let Some(batch) = stream.try_next().await.map_err(stream_err)? {
			chunks.extend(chunks_from_batch(&batch)?);
		}
		let corpus = Corpus::new(chunks)?;
		tracing::info!(table = table_name, chunks = corpus.len(), dim, "lance chunk table opened");
		Ok(Self { table, corpus, dim, model_id })
	}

	pub fn dim(&self) -> usize { self.dim }
}

#[async_trait]
impl ChunkStore for LanceChunkStore {
	fn model_id(&self) -> Option<&str> { self.model_id.as_deref() }

	fn all_chunks(&self) -> &[Chunk] { self.corpus.chunks() }

	fn get_metadata(&self, id: ChunkId) -> Option<&Chunk> { self.corpus.get(id) }

	async fn get_neighbors(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
		if embedding.len() != self.dim {
			return Err(Error::contract(format!("query embedding has {} dimensions, table has {}", embedding.len(), self.dim)));
		}
		let mut stream = self
			.table
			.vector_search(embedding.to_vec())
			.map_err(lance_err)?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await
			.map_err(lance_err)?;
		let mut out = Vec::with_capacity(k);
		while let Some(batch) = stream.try_next().await.map_err(stream_err)? {
			let ids = column::<Int64Array>(&batch, "chunk_id")?;
			let distances = column::<Float32Array>(&batch, "_distance")?;
			for i in 0..batch.num_rows() {
				let chunk_id = u64::try_from(ids.value(i)).map_err(|_| Error::contract(format!("negative chunk id {}", ids.value(i))))?;
				out.push(Neighbor { chunk_id, distance: distances.value(i) });
			}
		}
		Ok(out)
	}
}
