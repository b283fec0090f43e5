use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use policyqa_core::traits::Embedder;
use policyqa_core::{Error, Result};
use tokenizers::Tokenizer;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

struct LoadedModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
}

impl LoadedModel {
    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        Ok(pooled.squeeze(0)?.to_device(&Device::Cpu)?.to_vec1()?)
    }
}

/// Local BGE-M3 (XLM-RoBERTa) embeddings with masked mean pooling.
///
/// Inference is CPU/GPU bound and runs on the blocking pool.
pub struct BgeM3Embedder {
    inner: Arc<LoadedModel>,
    model_id: String,
    dim: usize,
}

impl BgeM3Embedder {
    /// Loads `tokenizer.json`, `config.json` and `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> anyhow::Result<Self> {
        let start = Instant::now();
        let device = select_device();
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("reading {}", weights_path.display()))?;
        let vb = VarBuilder::from_tensors(weights.into_iter().collect(), DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        let dim = config.hidden_size;
        tracing::info!(dir = %model_dir.display(), dim, elapsed_ms = start.elapsed().as_millis() as u64, "BGE-M3 model loaded");
        Ok(Self {
            inner: Arc::new(LoadedModel { model, tokenizer, device, max_len }),
            model_id: format!("local:bge-m3:d{dim}"),
            dim,
        })
    }
}

#[async_trait]
impl Embedder for BgeM3Embedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        let started = Instant::now();
        let out = tokio::task::spawn_blocking(move || texts.iter().map(|t| inner.embed_one(t)).collect::<anyhow::Result<Vec<_>>>())
            .await
            .map_err(|e| Error::upstream(format!("embedding task failed: {e}")))?
            .map_err(|e| Error::upstream(format!("local embedding failed: {e}")))?;
        tracing::debug!(texts = out.len(), elapsed_ms = started.elapsed().as_millis() as u64, "local embeddings computed");
        Ok(out)
    }
}

/// Model directory: configured path, then `APP_MODEL_DIR`, then `models/bge-m3`.
pub fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    let candidates = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::iter::once(PathBuf::from("models/bge-m3")));
    for dir in candidates {
        if dir.exists() {
            tracing::info!(dir = %dir.display(), "using model directory");
            return Ok(dir);
        }
    }
    Err(Error::NotFound("BGE-M3 model directory".into()))
}
