use thiserror::Error;

/// Failure classes of the retrieval core.
///
/// "Nothing matched" is never an error: it is an empty result.
#[derive(Debug, Error)]
pub enum Error {
    /// Embedding service, vector index, language model or lexical index
    /// cannot serve the request. Fatal to the current query.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A collaborator broke its interface contract (wrong variation count,
    /// short ranked list, unknown chunk id, ...).
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn upstream(msg: impl Into<String>) -> Self { Error::UpstreamUnavailable(msg.into()) }

    pub fn contract(msg: impl Into<String>) -> Self { Error::ContractViolation(msg.into()) }

    pub fn is_upstream(&self) -> bool { matches!(self, Error::UpstreamUnavailable(_)) }

    pub fn is_contract_violation(&self) -> bool { matches!(self, Error::ContractViolation(_)) }
}

pub type Result<T> = std::result::Result<T, Error>;
