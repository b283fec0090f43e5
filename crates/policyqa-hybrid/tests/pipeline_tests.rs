use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use policyqa_core::config::{Bm25Settings, ExpanderSettings};
use policyqa_core::traits::{ChunkStore, Embedder, QueryExpander, Retriever};
use policyqa_core::types::{Chunk, RetrievalMode, RetrievalResult};
use policyqa_core::{Error, Result};
use policyqa_embed::HashEmbedder;
use policyqa_hybrid::{CancellationToken, HybridRetriever, LlmQueryExpander, StaticQueryExpander};
use policyqa_text::{Bm25Index, SparseRetriever};
use policyqa_vector::{ChunkIndexFile, DenseRetriever, IndexedChunk, MemoryChunkStore};
use serde_json::json;

const DIM: usize = 128;

const POLICY: &[(&str, &str)] = &[
    ("A waiting period of 30 days applies before cover starts.", "waiting period before cover starts"),
    ("Flood damage to basements is excluded unless declared.", "flood damage exclusions"),
    ("Premiums are payable monthly with a grace period of 14 days.", "premium payment and grace period"),
    ("You may cancel at any time and receive a refund of unused premium.", "cancellation and refunds"),
    ("Theft of personal belongings away from home is covered up to 2000.", "theft away from home"),
    ("Emergency accommodation is paid for up to 60 days after a fire.", "accommodation after fire"),
    ("Claims must be lodged within 90 days with supporting documents.", "claims process and documents"),
];

struct Counting {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for Counting {
    fn model_id(&self) -> &str { self.inner.model_id() }
    fn dim(&self) -> usize { DIM }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

fn store() -> Arc<MemoryChunkStore> {
    let embedder = HashEmbedder::new(DIM);
    let chunks = POLICY
        .iter()
        .enumerate()
        .map(|(i, (text, summary))| {
            let id = (i as u64 + 1) * 10;
            IndexedChunk {
                chunk: Chunk {
                    chunk_id: id,
                    text: (*text).to_string(),
                    chunk_summary: (*summary).to_string(),
                    start_offset: i * 80,
                    end_offset: i * 80 + text.len(),
                    page_start: i as u32 + 1,
                    page_end: i as u32 + 1,
                },
                embedding: embedder.embed_text(summary),
            }
        })
        .collect();
    let index = ChunkIndexFile { model: Some(embedder.model_id().to_string()), dimension: DIM, chunks };
    Arc::new(MemoryChunkStore::from_index(index).unwrap())
}

fn variations() -> StaticQueryExpander {
    StaticQueryExpander::new(["how long until cover begins", "waiting period length", "when does the policy start"])
}

fn pipeline(expander: impl QueryExpander + 'static) -> (HybridRetriever, Arc<Counting>) {
    let store = store();
    let embedder = Arc::new(Counting { inner: HashEmbedder::new(DIM), calls: AtomicUsize::new(0) });
    let dense = DenseRetriever::new(store.clone(), embedder.clone());
    let sparse = SparseRetriever::new(Arc::new(Bm25Index::build(store.all_chunks(), Bm25Settings::default())));
    (HybridRetriever::new(Arc::new(expander), dense, sparse, store), embedder)
}

#[tokio::test]
async fn end_to_end_ranked_results() {
    let (hybrid, embedder) = pipeline(variations());
    let results = hybrid.search("What is the waiting period?").await.unwrap();

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
    assert_eq!(results.total_before_dedup, 40);
    assert!(results.total_after_dedup <= POLICY.len());
    assert_eq!(results.len(), results.total_after_dedup.min(10));
    assert_eq!(results.chunks[0].chunk_id, 10);
    assert!(results.chunks.windows(2).all(|w| w[0].rrf_score >= w[1].rrf_score));
    for chunk in &results.chunks {
        assert!(!chunk.text.is_empty());
        assert!(!chunk.sources.is_empty());
        assert!(chunk.appearances >= 1 && chunk.appearances <= 8);
    }
    assert_eq!(results.chunks[0].citation(), "[Chunk 10, p.1-1]");
}

#[tokio::test]
async fn lists_come_dense_first_in_query_order() {
    let (hybrid, _) = pipeline(variations());
    let queries = hybrid.expand("What is the waiting period?").await.unwrap();
    let lists = hybrid.retrieve_lists(&queries).await.unwrap();
    let modes: Vec<RetrievalMode> = lists.iter().map(|l| l.mode).collect();
    assert_eq!(modes, [[RetrievalMode::Dense; 4], [RetrievalMode::Sparse; 4]].concat());
    let order: Vec<&str> = queries.iter().collect();
    for half in lists.chunks(4) {
        assert_eq!(half.iter().map(|l| l.query.as_str()).collect::<Vec<_>>(), order);
    }
}

#[tokio::test]
async fn top_k_is_configurable() {
    let (hybrid, _) = pipeline(variations());
    let results = hybrid.with_top_k(3).search("flood damage").await.unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn two_variations_fail_before_retrieval() {
    let (hybrid, embedder) = pipeline(StaticQueryExpander::new(["a", "b"]));
    let err = hybrid.search("What is the waiting period?").await.unwrap_err();
    assert!(err.is_contract_violation(), "{err}");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let (hybrid, embedder) = pipeline(variations());
    assert!(hybrid.search("   ").await.unwrap_err().is_contract_violation());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

fn llm(base_url: &str) -> LlmQueryExpander {
    let settings = ExpanderSettings { base_url: base_url.to_string(), timeout_secs: 5, ..ExpanderSettings::default() };
    LlmQueryExpander::new("test-key".into(), &settings).unwrap()
}

/// Chat completion whose message content is the given variation list.
async fn answering<'a>(server: &'a MockServer, variations: &[&str]) -> httpmock::Mock<'a> {
    let content = json!({ "variations": variations }).to_string();
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions").header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }));
        })
        .await
}

#[tokio::test]
async fn language_model_variations_drive_the_search() {
    let server = MockServer::start_async().await;
    let mock = answering(&server, &["how long until cover begins", "waiting period length", "when does the policy start"]).await;
    let (hybrid, embedder) = pipeline(llm(&server.base_url()));

    let queries = hybrid.expand("What is the waiting period?").await.unwrap();
    assert_eq!(queries.variations(), ["how long until cover begins", "waiting period length", "when does the policy start"]);
    let results = hybrid.search_queries(&queries).await.unwrap();
    assert_eq!(results.chunks[0].chunk_id, 10);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
    mock.assert_async().await;
}

#[tokio::test]
async fn language_model_with_two_variations_is_a_contract_violation() {
    let server = MockServer::start_async().await;
    answering(&server, &["waiting period length", "when does cover start"]).await;
    let (hybrid, embedder) = pipeline(llm(&server.base_url()));

    let err = hybrid.search("What is the waiting period?").await.unwrap_err();
    assert!(err.is_contract_violation(), "{err}");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn language_model_with_four_variations_is_a_contract_violation() {
    let server = MockServer::start_async().await;
    answering(&server, &["a waiting period", "b waiting period", "c waiting period", "d waiting period"]).await;
    let (hybrid, embedder) = pipeline(llm(&server.base_url()));

    let err = hybrid.search("What is the waiting period?").await.unwrap_err();
    assert!(err.is_contract_violation(), "{err}");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn language_model_prose_is_a_contract_violation() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({ "choices": [{ "message": { "content": "Sure! Here are three queries." } }] }));
        })
        .await;
    let (hybrid, _) = pipeline(llm(&server.base_url()));
    assert!(hybrid.search("What is the waiting period?").await.unwrap_err().is_contract_violation());
}

#[tokio::test]
async fn language_model_http_error_is_upstream_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("internal error");
        })
        .await;
    let (hybrid, embedder) = pipeline(llm(&server.base_url()));

    let err = hybrid.search("What is the waiting period?").await.unwrap_err();
    assert!(err.is_upstream(), "{err}");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_language_model_is_upstream_unavailable() {
    // nothing listens on the discard port
    let (hybrid, _) = pipeline(llm("http://127.0.0.1:9"));
    let err = hybrid.search("What is the waiting period?").await.unwrap_err();
    assert!(err.is_upstream(), "{err}");
}

struct Unready;

#[async_trait]
impl Retriever for Unready {
    fn mode(&self) -> RetrievalMode { RetrievalMode::Sparse }
    async fn retrieve(&self, _query: &str) -> Result<RetrievalResult> { Err(Error::upstream("lexical index not ready")) }
}

#[tokio::test]
async fn sparse_failure_aborts_the_query() {
    let store = store();
    let dense = DenseRetriever::new(store.clone(), Arc::new(HashEmbedder::new(DIM)));
    let hybrid = HybridRetriever::new(Arc::new(variations()), dense, Unready, store);
    let err = hybrid.search("What is the waiting period?").await.unwrap_err();
    assert!(err.is_upstream(), "{err}");
}

struct Phantom;

#[async_trait]
impl Retriever for Phantom {
    fn mode(&self) -> RetrievalMode { RetrievalMode::Dense }
    async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        Ok(RetrievalResult::from_ranked(query, RetrievalMode::Dense, [(999, 0.9)]))
    }
}

#[tokio::test]
async fn unknown_fused_id_is_contract_violation() {
    let store = store();
    let sparse = SparseRetriever::new(Arc::new(Bm25Index::build(store.all_chunks(), Bm25Settings::default())));
    let hybrid = HybridRetriever::new(Arc::new(variations()), Phantom, sparse, store);
    let err = hybrid.search("What is the waiting period?").await.unwrap_err();
    assert!(err.is_contract_violation(), "{err}");
}

struct Stalled;

#[async_trait]
impl QueryExpander for Stalled {
    async fn expand(&self, _query: &str) -> Result<Vec<String>> { futures::future::pending().await }
}

#[tokio::test]
async fn cancellation_stops_a_stalled_search() {
    let (hybrid, embedder) = pipeline(Stalled);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = hybrid.search_cancellable("What is the waiting period?", &token).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_token_short_circuits() {
    let (hybrid, _) = pipeline(variations());
    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(hybrid.search_cancellable("anything", &token).await, Err(Error::Cancelled)));
}

#[tokio::test]
async fn uncancelled_search_completes() {
    let (hybrid, _) = pipeline(variations());
    let results = hybrid.search_cancellable("claims documents", &CancellationToken::new()).await.unwrap();
    assert!(!results.is_empty());
}
