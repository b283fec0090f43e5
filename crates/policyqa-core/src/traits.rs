use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, ChunkId, Neighbor, QuerySet, RetrievalMode, RetrievalResult};

/// Turns text into vectors. The same model must embed chunk summaries at
/// index time and queries at search time.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model, e.g. `openai:text-embedding-3-small`.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| crate::error::Error::upstream("embedder returned no vector"))
    }
}

/// Read-only chunk corpus plus its vector index.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Model id recorded when the summaries were embedded, if known.
    fn model_id(&self) -> Option<&str>;
    /// Every chunk, in corpus order.
    fn all_chunks(&self) -> &[Chunk];
    fn get_metadata(&self, id: ChunkId) -> Option<&Chunk>;
    /// Up to `k` nearest chunks by cosine distance, closest first.
    async fn get_neighbors(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    fn len(&self) -> usize { self.all_chunks().len() }
    fn is_empty(&self) -> bool { self.all_chunks().is_empty() }
}

/// Produces alternative phrasings of one user query.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<Vec<String>>;
}

/// One retrieval engine (dense or sparse).
#[async_trait]
pub trait Retriever: Send + Sync {
    fn mode(&self) -> RetrievalMode;
    async fn retrieve(&self, query: &str) -> Result<RetrievalResult>;

    /// Runs every query of the set concurrently; output keeps query order.
    async fn retrieve_all(&self, queries: &QuerySet) -> Result<Vec<RetrievalResult>> {
        futures::future::try_join_all(queries.iter().map(|q| self.retrieve(q))).await
    }
}
