mod common;

use common::{index, DIM};
use policyqa_core::traits::ChunkStore;
use policyqa_core::Error;
use policyqa_embed::HashEmbedder;
use policyqa_vector::{write_chunk_table, LanceChunkStore};
use tempfile::TempDir;

#[tokio::test]
async fn lance_table_round_trip() {
	let tmp = TempDir::new().expect("tmp");
	let written = write_chunk_table(tmp.path(), "chunks_test", &index(7)).await.expect("write");
	assert_eq!(written, 7);

	let store = LanceChunkStore::open(tmp.path(), "chunks_test").await.expect("open");
	assert_eq!(store.len(), 7);
	assert_eq!(store.dim(), DIM);
	assert_eq!(store.model_id(), Some("hash:d64"));
	let chunk = store.get_metadata(6).expect("chunk 6");
	assert_eq!(chunk.chunk_summary, "emergency accommodation after a fire");
	assert_eq!((chunk.page_start, chunk.page_end), (6, 7));

	let q = HashEmbedder::new(DIM).embed_text("emergency accommodation after a fire");
	let neighbors = store.get_neighbors(&q, 5).await.expect("search");
	assert_eq!(neighbors.len(), 5);
	assert_eq!(neighbors[0].chunk_id, 6);
	assert!(neighbors[0].distance.abs() < 1e-4);
}

#[tokio::test]
async fn existing_table_is_not_overwritten() {
	let tmp = TempDir::new().expect("tmp");
	write_chunk_table(tmp.path(), "chunks", &index(2)).await.expect("write");
	let err = write_chunk_table(tmp.path(), "chunks", &index(3)).await.unwrap_err();
	assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
}

#[tokio::test]
async fn missing_table_is_not_found() {
	let tmp = TempDir::new().expect("tmp");
	let err = LanceChunkStore::open(tmp.path(), "absent").await.err().expect("error");
	assert!(matches!(err, Error::NotFound(_)), "{err}");
}
