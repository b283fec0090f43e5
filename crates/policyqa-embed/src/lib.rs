//! Query and summary embedders behind [`policyqa_core::traits::Embedder`].
//!
//! - [`HashEmbedder`]: deterministic, offline
//! - [`OpenAiEmbedder`]: OpenAI-compatible HTTP endpoint
//! - [`BgeM3Embedder`]: local BGE-M3 through candle

use std::sync::Arc;

use policyqa_core::config::{EmbedderProvider, EmbedderSettings};
use policyqa_core::traits::Embedder;
use policyqa_core::{Error, Result};

pub mod device;
mod hash;
mod model;
mod openai;
pub mod pool;
pub mod tokenize;

pub use hash::HashEmbedder;
pub use model::{BgeM3Embedder, resolve_model_dir};
pub use openai::OpenAiEmbedder;
pub use pool::masked_mean_l2;

/// Builds the embedder selected by `settings.provider`.
pub fn get_default_embedder(settings: &EmbedderSettings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbedderProvider::Hash => Arc::new(HashEmbedder::new(settings.dim)),
        EmbedderProvider::OpenAi => Arc::new(OpenAiEmbedder::from_settings(settings)?),
        EmbedderProvider::Local => {
            let dir = resolve_model_dir(settings.model_dir.as_deref())?;
            Arc::new(BgeM3Embedder::load(&dir, settings.max_len).map_err(|e| Error::upstream(format!("{e:#}")))?)
        }
    };
    tracing::info!(model = embedder.model_id(), dim = embedder.dim(), "embedder ready");
    Ok(embedder)
}
