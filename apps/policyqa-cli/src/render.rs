use policyqa_core::types::{FinalRankedResults, QuerySet, RetrievalResult};
use policyqa_core::traits::ChunkStore;

use crate::app::Stats;

const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        format!("{}...", flat.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        flat
    }
}

pub fn print_results(queries: &QuerySet, results: &FinalRankedResults) {
    println!("Query: {}", queries.original());
    for (i, v) in queries.variations().iter().enumerate() {
        println!("  variation {}: {}", i + 1, v);
    }
    println!();
    if results.is_empty() {
        println!("No matching chunks.");
        return;
    }
    for (i, chunk) in results.chunks.iter().enumerate() {
        println!(
            "{:>2}. {} rrf={:.6} seen {}x via {}",
            i + 1,
            chunk.citation(),
            chunk.rrf_score,
            chunk.appearances,
            chunk.sources_label()
        );
        if !chunk.summary.is_empty() {
            println!("    summary: {}", preview(&chunk.summary));
        }
        println!("    {}", preview(&chunk.text));
    }
    println!();
    println!("{} raw hits, {} unique chunks, {} shown", results.total_before_dedup, results.total_after_dedup, results.len());
}

pub fn print_list(result: &RetrievalResult, store: &dyn ChunkStore) {
    println!("{} results for: {}", result.mode, result.query);
    for hit in &result.hits {
        let text = store.get_metadata(hit.chunk_id).map(|c| preview(&c.text)).unwrap_or_default();
        println!("{:>2}. chunk {} score={:.4}", hit.rank + 1, hit.chunk_id, hit.score);
        println!("    {text}");
    }
}

pub fn print_stats(stats: &Stats) {
    println!("store backend:   {:?}", stats.backend);
    println!("chunks:          {}", stats.chunks);
    println!("index model:     {}", stats.index_model.as_deref().unwrap_or("unknown"));
    println!("query model:     {} (dim {})", stats.query_model, stats.dim);
    println!("bm25 vocabulary: {}", stats.vocabulary);
    println!("avg chunk len:   {:.1} tokens", stats.avgdl);
}
