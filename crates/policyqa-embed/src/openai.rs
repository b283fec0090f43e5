use std::time::Duration;

use async_trait::async_trait;
use policyqa_core::config::EmbedderSettings;
use policyqa_core::traits::Embedder;
use policyqa_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Inputs per `/embeddings` request.
const BATCH_SIZE: usize = 100;
const MAX_RETRIES: u32 = 3;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    model_id: String,
    dim: usize,
    base_url: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct EmbeddingResponse {
    pub(crate) data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
pub(crate) struct EmbeddingData {
    #[serde(default)]
    pub(crate) index: usize,
    pub(crate) embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Reads the API key from the env var named in `settings.api_key_env`.
    pub fn from_settings(settings: &EmbedderSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| Error::InvalidConfig(format!("environment variable {} is not set", settings.api_key_env)))?;
        Self::new(api_key, settings)
    }

    pub fn new(api_key: String, settings: &EmbedderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::upstream(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: settings.model.clone(),
            model_id: format!("openai:{}", settings.model),
            dim: settings.dim,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * 2_u64.pow(attempt))).await;
            }
            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                // a malformed answer will not improve on retry
                Err(e @ Error::ContractViolation(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, max_retries = MAX_RETRIES, error = %e, "embedding request failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::upstream("embedding request failed")))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { input: texts, model: &self.model })
            .send()
            .await
            .map_err(|e| Error::upstream(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(format!("embedding API error {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::contract(format!("unreadable embedding response: {e}")))?;
        collect_embeddings(parsed, texts.len(), self.dim)
    }
}

/// Orders vectors by their `index` and checks count and width. The
/// indices must be exactly `0..expected`.
pub(crate) fn collect_embeddings(response: EmbeddingResponse, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(Error::contract(format!("embedding API returned {} vectors for {} inputs", data.len(), expected)));
    }
    data.sort_by_key(|d| d.index);
    if let Some((position, d)) = data.iter().enumerate().find(|(i, d)| d.index != *i) {
        return Err(Error::contract(format!(
            "embedding API returned index {} where {} was expected",
            d.index, position
        )));
    }
    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dim {
                Ok(d.embedding)
            } else {
                Err(Error::contract(format!("embedding has {} dimensions, expected {}", d.embedding.len(), dim)))
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            all.extend(self.request_with_retry(batch).await?);
        }
        Ok(all)
    }
}
