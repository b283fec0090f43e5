#![allow(dead_code)]

use policyqa_core::types::Chunk;
use policyqa_embed::HashEmbedder;
use policyqa_vector::{ChunkIndexFile, IndexedChunk};

pub const DIM: usize = 64;

pub const SUMMARIES: &[(u64, &str)] = &[
	(1, "waiting period before cover starts"),
	(2, "flood damage exclusions for basements"),
	(3, "premium payment schedule and grace days"),
	(4, "cancellation and refund of unused premium"),
	(5, "theft of personal belongings away from home"),
	(6, "emergency accommodation after a fire"),
	(7, "claims process and required documents"),
];

pub fn chunks(n: usize) -> Vec<Chunk> {
	SUMMARIES
		.iter()
		.take(n)
		.map(|&(id, summary)| Chunk {
			chunk_id: id,
			text: format!("Section {id}. {summary}."),
			chunk_summary: summary.to_string(),
			start_offset: (id as usize - 1) * 100,
			end_offset: id as usize * 100,
			page_start: id as u32,
			page_end: id as u32 + 1,
		})
		.collect()
}

pub fn index(n: usize) -> ChunkIndexFile {
	let embedder = HashEmbedder::new(DIM);
	ChunkIndexFile {
		model: Some(format!("hash:d{DIM}")),
		dimension: DIM,
		chunks: chunks(n)
			.into_iter()
			.map(|chunk| IndexedChunk { embedding: embedder.embed_text(&chunk.chunk_summary), chunk })
			.collect(),
	}
}
