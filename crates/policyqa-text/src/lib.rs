//! policyqa-text
//!
//! Lexical side of hybrid retrieval: a BM25 Okapi index over chunk text,
//! tokenised with a whitespace + lowercase tantivy analyzer, and the sparse
//! retriever built on it.

pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::Bm25Index;
pub use search::SparseRetriever;
