use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use policyqa_core::config::ExpanderSettings;
use policyqa_core::traits::QueryExpander;
use policyqa_core::types::QUERY_VARIATIONS;
use policyqa_core::{Error, Result};

fn instructions() -> String {
    format!(
        "You are given a user query about an insurance policy document.\n\
         Generate {QUERY_VARIATIONS} alternative queries that express the same intent \
         using different wording and phrasing.\n\n\
         Rules:\n\
         - Preserve the original meaning.\n\
         - Do NOT introduce new facts.\n\
         - Do NOT answer the query.\n\
         - Each variation must be a standalone search query.\n\n\
         Respond with a JSON object of the form {{\"variations\": [\"...\", \"...\", \"...\"]}} and nothing else."
    )
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Variations {
    variations: Vec<String>,
}

/// Extracts the variation list from the model's JSON answer. The count is
/// left for [`policyqa_core::types::QuerySet`] to check.
pub fn parse_variations(content: &str) -> Result<Vec<String>> {
    let parsed: Variations = serde_json::from_str(content.trim())
        .map_err(|e| Error::contract(format!("query expander answered with unparsable JSON: {e}")))?;
    Ok(parsed.variations)
}

/// Query expansion through an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmQueryExpander {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmQueryExpander {
    pub fn from_settings(settings: &ExpanderSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| Error::InvalidConfig(format!("environment variable {} is not set", settings.api_key_env)))?;
        Self::new(api_key, settings)
    }

    pub fn new(api_key: String, settings: &ExpanderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::upstream(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl QueryExpander for LlmQueryExpander {
    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let system = instructions();
        let user = format!("User query: {query}");
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "system", content: &system }, ChatMessage { role: "user", content: &user }],
            response_format: ResponseFormat { kind: "json_object" },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("query expansion request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(format!("language model API error {status}: {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::contract(format!("unreadable chat completion: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::contract("chat completion carried no content"))?;
        let variations = parse_variations(&content)?;
        tracing::debug!(query, generated = variations.len(), "query variations generated");
        Ok(variations)
    }
}

/// Returns the same caller-supplied variations for every query.
#[derive(Debug, Clone, Default)]
pub struct StaticQueryExpander {
    variations: Vec<String>,
}

impl StaticQueryExpander {
    pub fn new<I, S>(variations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { variations: variations.into_iter().map(Into::into).collect() }
    }
}

#[async_trait]
impl QueryExpander for StaticQueryExpander {
    async fn expand(&self, _query: &str) -> Result<Vec<String>> { Ok(self.variations.clone()) }
}
