//! Reciprocal Rank Fusion: score = Σ 1/(K + rank_i)
//!
//! Ranks are 0-indexed positions within each list. Raw scores are never
//! looked at, so dense and sparse lists combine without normalisation.

use std::collections::{BTreeSet, HashMap};

use policyqa_core::types::{ChunkId, FusedCandidate, RetrievalResult};

/// Smoothing constant.
pub const RRF_K: f64 = 60.0;

pub fn rrf_contribution(rank: usize) -> f64 { 1.0 / (RRF_K + rank as f64) }

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionOutcome {
    pub candidates: Vec<FusedCandidate>,
    /// Raw entries across all input lists.
    pub total_before_dedup: usize,
    /// Distinct chunk ids across all input lists.
    pub total_after_dedup: usize,
}

/// Fuses ranked lists and keeps the `top_k` best candidates.
///
/// Lists are consumed in the order given, so per-chunk sums are reproducible.
/// Output is sorted by descending score, then ascending chunk id.
pub fn fuse(lists: &[RetrievalResult], top_k: usize) -> FusionOutcome {
    let mut by_id: HashMap<ChunkId, FusedCandidate> = HashMap::new();
    let mut total_before_dedup = 0;

    for list in lists {
        for (rank, hit) in list.hits.iter().enumerate() {
            total_before_dedup += 1;
            let entry = by_id.entry(hit.chunk_id).or_insert_with(|| FusedCandidate {
                chunk_id: hit.chunk_id,
                rrf_score: 0.0,
                appearances: 0,
                sources: BTreeSet::new(),
            });
            entry.rrf_score += rrf_contribution(rank);
            entry.appearances += 1;
            entry.sources.insert(list.mode);
        }
    }

    let total_after_dedup = by_id.len();
    let mut candidates: Vec<FusedCandidate> = by_id.into_values().collect();
    candidates.sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score).then(a.chunk_id.cmp(&b.chunk_id)));
    candidates.truncate(top_k);

    FusionOutcome { candidates, total_before_dedup, total_after_dedup }
}
