//! End-to-end behavior of the cache-first embedder against a mock provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domsim_cache::{FilesystemStore, KeyValueStore, MemoryStore};
use domsim_embeddings::{
    CachedEmbedder, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIConfig,
    OpenAIProvider, Result,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn openai_mock(expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [0.25, -0.5, 0.125], "index": 0}],
            "model": "model-x"
        })))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

fn openai(server: &MockServer) -> Arc<dyn EmbeddingProvider> {
    let config = OpenAIConfig::default()
        .with_api_key("sk-test")
        .with_base_url(server.uri());
    Arc::new(OpenAIProvider::new(config).unwrap())
}

#[tokio::test]
async fn test_warm_path_survives_restart() {
    let server = openai_mock(1).await;
    let dir = tempfile::tempdir().unwrap();

    let v1 = {
        let store = Arc::new(FilesystemStore::open(dir.path()).await.unwrap());
        let embedder = CachedEmbedder::new(openai(&server), store);
        embedder.embed("model-x", "hello world").await.unwrap()
    };

    let store = Arc::new(FilesystemStore::open(dir.path()).await.unwrap());
    let embedder = CachedEmbedder::new(openai(&server), store);
    let v2 = embedder.embed("model-x", "hello world").await.unwrap();

    assert_eq!(v1, vec![0.25, -0.5, 0.125]);
    assert_eq!(v1, v2);
    assert_eq!(embedder.stats().provider_calls, 0);
    assert_eq!(embedder.stats().cache_hits, 1);
    // MockServer verifies `expect(1)` on drop.
}

#[tokio::test]
async fn test_stored_entry_is_readable_json() {
    let server = openai_mock(1).await;
    let store = Arc::new(MemoryStore::new());
    let embedder = CachedEmbedder::new(openai(&server), store.clone());

    embedder.embed("model-x", "text").await.unwrap();

    let key = embedder.key_for("model-x", "text");
    let bytes = store.get(&key).await.unwrap().unwrap();
    let stored: Vec<f32> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stored, vec![0.25, -0.5, 0.125]);
}

/// Provider that is slow enough for concurrent callers to overlap.
#[derive(Default)]
struct SlowProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(EmbeddingResponse {
            embedding: vec![request.text.len() as f32, 1.0],
            model: request.model,
            tokens_used: None,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_requests_call_provider_once() {
    let provider = Arc::new(SlowProvider::default());
    let embedder = Arc::new(CachedEmbedder::new(
        provider.clone(),
        Arc::new(MemoryStore::new()),
    ));

    let tasks = (0..8).map(|_| {
        let embedder = Arc::clone(&embedder);
        tokio::spawn(async move { embedder.embed("m", "shared text").await })
    });
    let results = futures::future::join_all(tasks).await;

    let vectors: Vec<Vec<f32>> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    assert!(vectors.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(embedder.stats().provider_calls, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_are_not_serialized_together() {
    let provider = Arc::new(SlowProvider::default());
    let embedder = Arc::new(CachedEmbedder::new(
        provider.clone(),
        Arc::new(MemoryStore::new()),
    ));

    let tasks = (0..4).map(|i| {
        let embedder = Arc::clone(&embedder);
        tokio::spawn(async move { embedder.embed("m", &format!("text {i}")).await })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
}
