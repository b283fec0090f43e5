//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RETRIEVAL__TOP_K=5`). Relative
//! paths in the settings resolve against the directory of the config file.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> { Self::load_from(Path::new("config.toml")) }

    /// Loads `path` (missing files are fine) plus its per-environment sibling.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let base_dir = path.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let mut figment = Figment::new().merge(Toml::file(path));
        let env_file = match env_name.as_str() {
            "dev" | "development" => Some("config.dev.toml"),
            "prod" | "production" => Some("config.prod.toml"),
            "test" | "testing" => Some("config.test.toml"),
            _ => None,
        };
        if let Some(name) = env_file {
            figment = figment.merge(Toml::file(base_dir.join(name)));
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        tracing::debug!(config = %path.display(), env = %env_name, "configuration sources merged");

        Ok(Self { figment, base_dir })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed settings with defaults filled in, paths resolved and validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.resolve_paths(&self.base_dir);
        settings.validate()?;
        Ok(settings)
    }

    pub fn base_dir(&self) -> &Path { &self.base_dir }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub bm25: Bm25Settings,
    pub store: StoreSettings,
    pub embedder: EmbedderSettings,
    pub expander: ExpanderSettings,
}

impl Settings {
    fn resolve_paths(&mut self, base: &Path) {
        self.store.chunk_index = resolve_with_base(base, self.store.chunk_index.to_string_lossy());
        self.store.lance_dir = resolve_with_base(base, self.store.lance_dir.to_string_lossy());
        if let Some(dir) = self.embedder.model_dir.take() {
            self.embedder.model_dir = Some(resolve_with_base(base, dir.to_string_lossy()));
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.retrieval.per_query_k == 0 {
            return Err(Error::InvalidConfig("retrieval.per_query_k must be at least 1".into()));
        }
        if self.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(Error::InvalidConfig(format!("bm25 parameters out of range: k1={} b={}", self.bm25.k1, self.bm25.b)));
        }
        if self.embedder.dim == 0 {
            return Err(Error::InvalidConfig("embedder.dim must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Ranked list length per query and mode.
    pub per_query_k: usize,
    /// Fused candidates handed to answer generation.
    pub top_k: usize,
    /// Decimal digits kept on per-engine scores.
    pub score_precision: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { per_query_k: 5, top_k: 10, score_precision: 4 } }
}

/// BM25 Okapi parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Settings {
    pub k1: f64,
    pub b: f64,
    /// Floor for negative idf values, as a fraction of the mean idf.
    pub epsilon: f64,
}

impl Default for Bm25Settings {
    fn default() -> Self { Self { k1: 1.5, b: 0.75, epsilon: 0.25 } }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Lance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// JSON chunk index read by the memory backend.
    pub chunk_index: PathBuf,
    pub lance_dir: PathBuf,
    pub table: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            chunk_index: PathBuf::from("data/chunk_index.json"),
            lance_dir: PathBuf::from("data/lancedb"),
            table: "vector_store".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProvider {
    /// Deterministic feature hashing; offline and for tests.
    #[default]
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
    /// Local BGE-M3 through candle.
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
    pub provider: EmbedderProvider,
    pub model: String,
    pub dim: usize,
    pub base_url: String,
    /// Name of the env var holding the API key, never the key itself.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub model_dir: Option<PathBuf>,
    pub max_len: usize,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::Hash,
            model: "text-embedding-3-small".to_string(),
            dim: 1536,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            model_dir: None,
            max_len: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpanderSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ExpanderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-5-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
