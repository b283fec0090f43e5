//! Chunk stores (in-memory JSON index, LanceDB) and the dense retriever.

pub mod lance;
pub mod memory;
pub mod schema;
pub mod search;

pub use lance::{write_chunk_table, LanceChunkStore};
pub use memory::{ChunkIndexFile, IndexedChunk, MemoryChunkStore};
pub use search::DenseRetriever;

use std::sync::Arc;

use policyqa_core::config::{StoreBackend, StoreSettings};
use policyqa_core::traits::ChunkStore;
use policyqa_core::Result;

/// Opens the store selected by `settings.backend`.
pub async fn open_store(settings: &StoreSettings) -> Result<Arc<dyn ChunkStore>> {
	Ok(match settings.backend {
		StoreBackend::Memory => Arc::new(MemoryChunkStore::load(&settings.chunk_index)?),
		StoreBackend::Lance => Arc::new(LanceChunkStore::open(&settings.lance_dir, &settings.table).await?),
	})
}
