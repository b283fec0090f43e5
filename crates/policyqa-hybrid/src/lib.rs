//! Hybrid retrieval pipeline: expand one query into four, run dense and
//! sparse retrieval for each, fuse the eight ranked lists with RRF and
//! enrich the survivors with chunk metadata.

use std::sync::Arc;
use std::time::Instant;

use policyqa_core::traits::{ChunkStore, QueryExpander, Retriever};
use policyqa_core::types::{FinalRankedResults, QuerySet, RankedChunk, RetrievalResult};
use policyqa_core::{Error, Result};
use policyqa_text::SparseRetriever;
use policyqa_vector::DenseRetriever;

pub mod cancel;
pub mod expand;
pub mod fusion;

pub use cancel::CancellationToken;
pub use expand::{LlmQueryExpander, StaticQueryExpander};
pub use fusion::{fuse, FusionOutcome, RRF_K};

pub struct HybridRetriever<D = DenseRetriever, S = SparseRetriever>
where
    D: Retriever,
    S: Retriever,
{
    expander: Arc<dyn QueryExpander>,
    dense: D,
    sparse: S,
    store: Arc<dyn ChunkStore>,
    top_k: usize,
}

impl<D, S> HybridRetriever<D, S>
where
    D: Retriever,
    S: Retriever,
{
    pub fn new(expander: Arc<dyn QueryExpander>, dense: D, sparse: S, store: Arc<dyn ChunkStore>) -> Self {
        Self { expander, dense, sparse, store, top_k: 10 }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn dense(&self) -> &D { &self.dense }

    pub fn sparse(&self) -> &S { &self.sparse }

    /// Original query plus three generated variations, validated.
    pub async fn expand(&self, query: &str) -> Result<QuerySet> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::contract("query must not be empty"));
        }
        let variations = self.expander.expand(query).await?;
        QuerySet::new(query, variations)
    }

    /// The eight ranked lists: dense for every query, then sparse for every
    /// query. Any failure aborts the whole batch.
    pub async fn retrieve_lists(&self, queries: &QuerySet) -> Result<Vec<RetrievalResult>> {
        let (dense, sparse) = tokio::try_join!(self.dense.retrieve_all(queries), self.sparse.retrieve_all(queries))?;
        Ok(dense.into_iter().chain(sparse).collect())
    }

    pub async fn search(&self, query: &str) -> Result<FinalRankedResults> {
        let started = Instant::now();
        let queries = self.expand(query).await?;
        let results = self.search_queries(&queries).await?;
        tracing::info!(
            query = queries.original(),
            raw = results.total_before_dedup,
            unique = results.total_after_dedup,
            returned = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hybrid search complete"
        );
        Ok(results)
    }

    /// Retrieval, fusion and enrichment for an already expanded query set.
    pub async fn search_queries(&self, queries: &QuerySet) -> Result<FinalRankedResults> {
        let lists = self.retrieve_lists(queries).await?;
        self.enrich(fuse(&lists, self.top_k))
    }

    /// Like [`search`](Self::search), but abandons all in-flight work and
    /// returns [`Error::Cancelled`] as soon as `token` is cancelled.
    pub async fn search_cancellable(&self, query: &str, token: &CancellationToken) -> Result<FinalRankedResults> {
        token.run(self.search(query)).await
    }

    fn enrich(&self, outcome: FusionOutcome) -> Result<FinalRankedResults> {
        let chunks = outcome
            .candidates
            .into_iter()
            .map(|candidate| {
                let chunk = self
                    .store
                    .get_metadata(candidate.chunk_id)
                    .ok_or_else(|| Error::contract(format!("fused chunk id {} has no metadata", candidate.chunk_id)))?;
                Ok(RankedChunk::new(candidate, chunk))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FinalRankedResults {
            chunks,
            total_before_dedup: outcome.total_before_dedup,
            total_after_dedup: outcome.total_after_dedup,
        })
    }
}
