use std::sync::Arc;

use async_trait::async_trait;

use policyqa_core::traits::Retriever;
use policyqa_core::types::{round_to, RetrievalMode, RetrievalResult};
use policyqa_core::Result;

use crate::index::Bm25Index;

/// Lexical retriever over a prebuilt [`Bm25Index`].
///
/// Building the index is the readiness barrier: a retriever can only be
/// constructed from an index that has finished building.
pub struct SparseRetriever {
	index: Arc<Bm25Index>,
	limit: usize,
	precision: u32,
}

impl SparseRetriever {
	pub fn new(index: Arc<Bm25Index>) -> Self { Self { index, limit: 5, precision: 4 } }

	pub fn with_limit(mut self, limit: usize) -> Self { self.limit = limit; self }

	pub fn with_precision(mut self, precision: u32) -> Self { self.precision = precision; self }

	pub fn index(&self) -> &Bm25Index { &self.index }
}

#[async_trait]
impl Retriever for SparseRetriever {
	fn mode(&self) -> RetrievalMode { RetrievalMode::Sparse }

	async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
		let ranked = self.index.top_k(query, self.limit)?;
		tracing::debug!(query, hits = ranked.len(), "sparse retrieval");
		let precision = self.precision;
		Ok(RetrievalResult::from_ranked(
			query,
			RetrievalMode::Sparse,
			ranked.into_iter().map(|(id, score)| (id, round_to(score, precision))),
		))
	}
}
