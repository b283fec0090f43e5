use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use policyqa_core::traits::ChunkStore;
use policyqa_core::types::{Chunk, ChunkId, Corpus, Neighbor};
use policyqa_core::{Error, Result};

/// On-disk JSON chunk index: chunks with their summary embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkIndexFile {
	/// Id of the model that embedded `chunk_summary`.
	#[serde(default)]
	pub model: Option<String>,
	pub dimension: usize,
	pub chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
	#[serde(flatten)]
	pub chunk: Chunk,
	pub embedding: Vec<f32>,
}

impl ChunkIndexFile {
	pub fn read(path: &Path) -> Result<Self> {
		if !path.exists() {
			return Err(Error::NotFound(format!("chunk index {}", path.display())));
		}
		let raw = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&raw)?)
	}

	pub fn write(&self, path: &Path) -> Result<()> {
		std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
		Ok(())
	}
}

/// Chunk store held entirely in memory with exact cosine search.
pub struct MemoryChunkStore {
	corpus: Corpus,
	vectors: Vec<Vec<f32>>,
	norms: Vec<f32>,
	dim: usize,
	model_id: Option<String>,
}

impl MemoryChunkStore {
	pub fn load(path: &Path) -> Result<Self> {
		let store = Self::from_index(ChunkIndexFile::read(path)?)?;
		tracing::info!(path = %path.display(), chunks = store.len(), dim = store.dim, "chunk index loaded");
		Ok(store)
	}

	pub fn from_index(index: ChunkIndexFile) -> Result<Self> {
		let dim = index.dimension;
		let mut chunks = Vec::with_capacity(index.chunks.len());
		let mut vectors = Vec::with_capacity(index.chunks.len());
		for IndexedChunk { chunk, embedding } in index.chunks {
			if embedding.len() != dim {
				return Err(Error::contract(format!(
					"chunk {} has a {}-dimensional embedding, index declares {}",
					chunk.chunk_id,
					embedding.len(),
					dim
				)));
			}
			chunks.push(chunk);
			vectors.push(embedding);
		}
		let norms = vectors.iter().map(|v| l2_norm(v)).collect();
		Ok(Self { corpus: Corpus::new(chunks)?, vectors, norms, dim, model_id: index.model })
	}

	pub fn dim(&self) -> usize { self.dim }
}

fn l2_norm(v: &[f32]) -> f32 { v.iter().map(|x| x * x).sum::<f32>().sqrt() }

/// `1 - cos(a, b)`; a zero vector is orthogonal to everything.
fn cosine_distance(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
	if a_norm == 0.0 || b_norm == 0.0 {
		return 1.0;
	}
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	1.0 - dot / (a_norm * b_norm)
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
	fn model_id(&self) -> Option<&str> { self.model_id.as_deref() }

	fn all_chunks(&self) -> &[Chunk] { self.corpus.chunks() }

	fn get_metadata(&self, id: ChunkId) -> Option<&Chunk> { self.corpus.get(id) }

	async fn get_neighbors(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
		if embedding.len() != self.dim {
			return Err(Error::contract(format!("query embedding has {} dimensions, index has {}", embedding.len(), self.dim)));
		}
		let q_norm = l2_norm(embedding);
		let mut scored: Vec<Neighbor> = self
			.corpus
			.chunks()
			.iter()
			.zip(self.vectors.iter().zip(&self.norms))
			.map(|(chunk, (v, &n))| Neighbor { chunk_id: chunk.chunk_id, distance: cosine_distance(embedding, q_norm, v, n) })
			.collect();
		// stable: equal distances keep corpus order
		scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
		scored.truncate(k);
		Ok(scored)
	}
}
