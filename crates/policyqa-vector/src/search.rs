use std::sync::Arc;

use async_trait::async_trait;
use policyqa_core::traits::{ChunkStore, Embedder, Retriever};
use policyqa_core::types::{round_to, RetrievalMode, RetrievalResult};
use policyqa_core::{Error, Result};

/// Semantic retrieval over chunk-summary embeddings.
pub struct DenseRetriever {
	store: Arc<dyn ChunkStore>,
	embedder: Arc<dyn Embedder>,
	limit: usize,
	precision: u32,
}

impl DenseRetriever {
	pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn Embedder>) -> Self {
		match store.model_id() {
			Some(indexed) if indexed != embedder.model_id() => tracing::warn!(
				index_model = indexed,
				query_model = embedder.model_id(),
				"query embedder differs from the model that built the chunk index"
			),
			_ => {}
		}
		Self { store, embedder, limit: 5, precision: 4 }
	}

	pub fn with_limit(mut self, limit: usize) -> Self {
		self.limit = limit;
		self
	}

	pub fn with_precision(mut self, precision: u32) -> Self {
		self.precision = precision;
		self
	}

	pub fn store(&self) -> &Arc<dyn ChunkStore> { &self.store }
}

#[async_trait]
impl Retriever for DenseRetriever {
	fn mode(&self) -> RetrievalMode { RetrievalMode::Dense }

	async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
		let embedding = self.embedder.embed(query).await?;
		let neighbors = self.store.get_neighbors(&embedding, self.limit).await?;

		let expected = self.limit.min(self.store.len());
		if neighbors.len() != expected {
			return Err(Error::contract(format!("vector index returned {} neighbours, expected {}", neighbors.len(), expected)));
		}
		if let Some(unknown) = neighbors.iter().find(|n| self.store.get_metadata(n.chunk_id).is_none()) {
			return Err(Error::contract(format!("vector index returned unknown chunk id {}", unknown.chunk_id)));
		}

		let result = RetrievalResult::from_ranked(
			query,
			RetrievalMode::Dense,
			neighbors.iter().map(|n| (n.chunk_id, round_to(1.0 - f64::from(n.distance), self.precision))),
		);
		tracing::debug!(query, hits = result.len(), top = ?result.hits.first().map(|h| h.chunk_id), "dense retrieval");
		Ok(result)
	}
}
