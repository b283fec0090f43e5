//! Domain types used by the dense, sparse and fusion engines.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{Error, Result};

pub type ChunkId = u64;

/// Number of generated variations carried by every [`QuerySet`].
pub const QUERY_VARIATIONS: usize = 3;

/// An immutable span of the policy document that is retrieved as a unit.
///
/// - `chunk_id`: stable integer identity within the corpus
/// - `text`: the raw chunk text, scored by the lexical engine
/// - `chunk_summary`: short summary, the only field embedded for dense search
/// - `start_offset`/`end_offset`: character span in the source document
/// - `page_start`/`page_end`: 1-indexed page span, `page_start <= page_end`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub text: String,
    #[serde(default)]
    pub chunk_summary: String,
    #[serde(default)]
    pub start_offset: usize,
    #[serde(default)]
    pub end_offset: usize,
    pub page_start: u32,
    pub page_end: u32,
}

/// Chunks in corpus order with an identifier lookup.
///
/// Construction enforces that every identifier maps to exactly one record.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    chunks: Vec<Chunk>,
    by_id: HashMap<ChunkId, usize>,
}

impl Corpus {
    pub fn new(chunks: Vec<Chunk>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(chunks.len());
        for (pos, chunk) in chunks.iter().enumerate() {
            if chunk.page_start > chunk.page_end {
                return Err(Error::contract(format!(
                    "chunk {} has page_start {} after page_end {}",
                    chunk.chunk_id, chunk.page_start, chunk.page_end
                )));
            }
            if by_id.insert(chunk.chunk_id, pos).is_some() {
                return Err(Error::contract(format!("duplicate chunk id {}", chunk.chunk_id)));
            }
        }
        Ok(Self { chunks, by_id })
    }

    pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.by_id.get(&id).map(|&pos| &self.chunks[pos])
    }

    /// Position of `id` in corpus order.
    pub fn position(&self, id: ChunkId) -> Option<usize> { self.by_id.get(&id).copied() }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }
}

/// Indicates which engine produced a ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Dense,
    Sparse,
}

impl RetrievalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalMode::Dense => "dense",
            RetrievalMode::Sparse => "sparse",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// The user's query followed by exactly [`QUERY_VARIATIONS`] rephrasings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySet {
    original: String,
    variations: Vec<String>,
}

impl QuerySet {
    /// Validates the expander contract: a non-blank original, exactly three
    /// variations, and four distinct query strings. Nothing is padded or
    /// truncated.
    pub fn new(original: impl Into<String>, variations: Vec<String>) -> Result<Self> {
        let original = original.into().trim().to_string();
        if original.is_empty() {
            return Err(Error::contract("query must not be empty"));
        }
        if variations.len() != QUERY_VARIATIONS {
            return Err(Error::contract(format!(
                "query expander returned {} variations, expected {}",
                variations.len(),
                QUERY_VARIATIONS
            )));
        }
        let variations: Vec<String> = variations.into_iter().map(|v| v.trim().to_string()).collect();
        let mut seen: Vec<&str> = vec![original.as_str()];
        for v in &variations {
            if v.is_empty() {
                return Err(Error::contract("query expander returned a blank variation"));
            }
            if seen.contains(&v.as_str()) {
                return Err(Error::contract(format!("query expander returned a duplicate query: {v:?}")));
            }
            seen.push(v);
        }
        Ok(Self { original, variations })
    }

    pub fn original(&self) -> &str { &self.original }

    pub fn variations(&self) -> &[String] { &self.variations }

    /// All queries, original first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.original.as_str()).chain(self.variations.iter().map(String::as_str))
    }
}

/// One ranked entry of a [`RetrievalResult`]; `rank` 0 is the best match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk_id: ChunkId,
    pub score: f64,
    pub rank: usize,
}

/// Ranked list produced by one engine for one query string.
///
/// Scores are engine-specific and never compared across modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub mode: RetrievalMode,
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    /// Builds a list from `(chunk_id, score)` pairs already in rank order.
    pub fn from_ranked<I>(query: impl Into<String>, mode: RetrievalMode, ranked: I) -> Self
    where
        I: IntoIterator<Item = (ChunkId, f64)>,
    {
        let hits = ranked
            .into_iter()
            .enumerate()
            .map(|(rank, (chunk_id, score))| RetrievalHit { chunk_id, score, rank })
            .collect();
        Self { query: query.into(), mode, hits }
    }

    pub fn len(&self) -> usize { self.hits.len() }

    pub fn is_empty(&self) -> bool { self.hits.is_empty() }
}

/// Nearest-neighbour answer from a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub chunk_id: ChunkId,
    pub distance: f32,
}

/// A chunk's aggregate across every list it appeared in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub chunk_id: ChunkId,
    pub rrf_score: f64,
    pub appearances: usize,
    pub sources: BTreeSet<RetrievalMode>,
}

/// A fused candidate enriched with the metadata needed for citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk_id: ChunkId,
    pub text: String,
    pub summary: String,
    pub page_start: u32,
    pub page_end: u32,
    pub rrf_score: f64,
    pub appearances: usize,
    pub sources: BTreeSet<RetrievalMode>,
}

impl RankedChunk {
    pub fn new(candidate: FusedCandidate, chunk: &Chunk) -> Self {
        Self {
            chunk_id: candidate.chunk_id,
            text: chunk.text.clone(),
            summary: chunk.chunk_summary.clone(),
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            rrf_score: candidate.rrf_score,
            appearances: candidate.appearances,
            sources: candidate.sources,
        }
    }

    /// Inline citation label, e.g. `[Chunk 12, p.3-4]`.
    pub fn citation(&self) -> String {
        format!("[Chunk {}, p.{}-{}]", self.chunk_id, self.page_start, self.page_end)
    }

    pub fn sources_label(&self) -> String {
        self.sources.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(" + ")
    }
}

/// Sole output of the retrieval core, consumed by answer generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalRankedResults {
    pub chunks: Vec<RankedChunk>,
    pub total_before_dedup: usize,
    pub total_after_dedup: usize,
}

impl FinalRankedResults {
    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }
}

/// Rounds to a fixed number of decimal digits.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
    (value * factor).round() / factor
}
