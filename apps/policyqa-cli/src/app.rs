//! Wires configured components into retrievers.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use policyqa_core::config::{Settings, StoreBackend};
use policyqa_core::traits::{ChunkStore, Embedder, QueryExpander};
use policyqa_embed::get_default_embedder;
use policyqa_hybrid::{HybridRetriever, LlmQueryExpander, StaticQueryExpander};
use policyqa_text::{Bm25Index, SparseRetriever};
use policyqa_vector::{open_store, DenseRetriever};

pub struct App {
    settings: Settings,
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    lexical: Arc<Bm25Index>,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub backend: StoreBackend,
    pub chunks: usize,
    pub index_model: Option<String>,
    pub query_model: String,
    pub dim: usize,
    pub vocabulary: usize,
    pub avgdl: f64,
}

impl App {
    pub async fn open(settings: Settings) -> anyhow::Result<Self> {
        let store = open_store(&settings.store).await.context("opening chunk store")?;
        let embedder = get_default_embedder(&settings.embedder).context("creating embedder")?;
        let lexical = Arc::new(Bm25Index::build(store.all_chunks(), settings.bm25));
        Ok(Self { settings, store, embedder, lexical })
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> { &self.store }

    pub fn dense(&self) -> DenseRetriever {
        DenseRetriever::new(self.store.clone(), self.embedder.clone())
            .with_limit(self.settings.retrieval.per_query_k)
            .with_precision(self.settings.retrieval.score_precision)
    }

    pub fn sparse(&self) -> SparseRetriever {
        SparseRetriever::new(self.lexical.clone())
            .with_limit(self.settings.retrieval.per_query_k)
            .with_precision(self.settings.retrieval.score_precision)
    }

    /// Uses the given variations verbatim when there are any, the language
    /// model otherwise.
    pub fn hybrid(&self, variations: Vec<String>) -> anyhow::Result<HybridRetriever> {
        let expander: Arc<dyn QueryExpander> = if variations.is_empty() {
            Arc::new(LlmQueryExpander::from_settings(&self.settings.expander).context("creating query expander")?)
        } else {
            Arc::new(StaticQueryExpander::new(variations))
        };
        Ok(HybridRetriever::new(expander, self.dense(), self.sparse(), self.store.clone()).with_top_k(self.settings.retrieval.top_k))
    }

    pub fn stats(&self) -> Stats {
        Stats {
            backend: self.settings.store.backend,
            chunks: self.store.len(),
            index_model: self.store.model_id().map(str::to_string),
            query_model: self.embedder.model_id().to_string(),
            dim: self.embedder.dim(),
            vocabulary: self.lexical.vocabulary_size(),
            avgdl: self.lexical.avgdl(),
        }
    }
}
