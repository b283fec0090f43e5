use std::collections::{BTreeSet, HashMap};

use policyqa_core::types::{RetrievalMode, RetrievalResult};
use policyqa_hybrid::{fuse, RRF_K};
use proptest::prelude::*;

fn arb_list() -> impl Strategy<Value = RetrievalResult> {
    let mode = prop_oneof![Just(RetrievalMode::Dense), Just(RetrievalMode::Sparse)];
    let ids = proptest::sample::subsequence((0u64..30).collect::<Vec<_>>(), 0..=5).prop_shuffle();
    (mode, ids).prop_map(|(mode, ids)| RetrievalResult::from_ranked("q", mode, ids.into_iter().map(|id| (id, 1.0))))
}

fn arb_lists() -> impl Strategy<Value = Vec<RetrievalResult>> { proptest::collection::vec(arb_list(), 0..=8) }

proptest! {
    #[test]
    fn counts_are_consistent(lists in arb_lists(), top_k in 1usize..20) {
        let out = fuse(&lists, top_k);
        let raw: usize = lists.iter().map(RetrievalResult::len).sum();
        let distinct: BTreeSet<u64> = lists.iter().flat_map(|l| l.hits.iter().map(|h| h.chunk_id)).collect();
        prop_assert_eq!(out.total_before_dedup, raw);
        prop_assert_eq!(out.total_after_dedup, distinct.len());
        prop_assert!(out.total_after_dedup <= out.total_before_dedup);
        prop_assert_eq!(out.candidates.len(), top_k.min(distinct.len()));
    }

    #[test]
    fn sorted_by_score_then_id(lists in arb_lists()) {
        let out = fuse(&lists, 50);
        for w in out.candidates.windows(2) {
            prop_assert!(w[0].rrf_score > w[1].rrf_score
                || (w[0].rrf_score == w[1].rrf_score && w[0].chunk_id < w[1].chunk_id));
        }
    }

    #[test]
    fn score_is_sum_of_reciprocal_ranks(lists in arb_lists()) {
        let mut expected: HashMap<u64, (f64, usize, BTreeSet<RetrievalMode>)> = HashMap::new();
        for list in &lists {
            for (rank, hit) in list.hits.iter().enumerate() {
                let e = expected.entry(hit.chunk_id).or_default();
                e.0 += 1.0 / (RRF_K + rank as f64);
                e.1 += 1;
                e.2.insert(list.mode);
            }
        }
        let out = fuse(&lists, 50);
        for c in &out.candidates {
            let (score, appearances, sources) = &expected[&c.chunk_id];
            prop_assert!((c.rrf_score - score).abs() < 1e-12);
            prop_assert_eq!(c.appearances, *appearances);
            prop_assert_eq!(&c.sources, sources);
        }
    }

    #[test]
    fn idempotent(lists in arb_lists(), top_k in 1usize..20) {
        prop_assert_eq!(fuse(&lists, top_k), fuse(&lists, top_k));
    }
}
