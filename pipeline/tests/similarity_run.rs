//! Similarity runs against stub providers and sources.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use domsim_cache::{KeyValueStore, MemoryStore};
use domsim_embeddings::{
    CachedEmbedder, EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
};
use domsim_pipeline::{
    BasicDomainCleaner, JsonTextSource, OutputConfig, Pipeline, PipelineConfig, PipelineError,
    SimilarityMatrixBuilder, SourceConfig, TextRecord,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Provider returning a fixed vector per text; unknown texts fail.
#[derive(Default)]
struct StubProvider {
    vectors: HashMap<String, Vec<f32>>,
    calls: Mutex<Vec<String>>,
}

impl StubProvider {
    fn with(mut self, text: &str, vector: &[f32]) -> Self {
        self.vectors.insert(text.to_string(), vector.to_vec());
        self
    }

    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> domsim_embeddings::Result<EmbeddingResponse> {
        self.calls.lock().unwrap().push(request.text.clone());
        match self.vectors.get(&request.text) {
            Some(vector) => Ok(EmbeddingResponse {
                embedding: vector.clone(),
                model: request.model,
                tokens_used: None,
            }),
            None => Err(EmbeddingError::ApiRequest {
                status: 500,
                body: format!("no stub for {:?}", request.text),
            }),
        }
    }
}

fn text(len: usize, fill: char) -> String {
    std::iter::repeat_n(fill, len).collect()
}

fn embedder(provider: &Arc<StubProvider>) -> CachedEmbedder {
    CachedEmbedder::new(provider.clone(), Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn test_filtering_keeps_only_long_texts() {
    let provider = Arc::new(
        StubProvider::default()
            .with(&text(50, 'a'), &[1.0, 0.0])
            .with(&text(150, 'b'), &[1.0, 1.0])
            .with(&text(200, 'c'), &[0.0, 1.0]),
    );
    let records = vec![
        TextRecord::new("short.com", text(50, 'a')),
        TextRecord::new("mid.com", text(150, 'b')),
        TextRecord::new("long.com", text(200, 'c')),
    ];

    let matrix = SimilarityMatrixBuilder::new(100, "model-x")
        .build(&records, &embedder(&provider))
        .await
        .unwrap();

    assert_eq!(matrix.labels(), ["mid.com", "long.com"]);
    assert_eq!(provider.calls(), 2);
    let sim = matrix.get("mid.com", "long.com").unwrap();
    assert!((sim - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
    assert_eq!(matrix.get("long.com", "mid.com"), Some(sim));
}

#[tokio::test]
async fn test_empty_input_makes_no_provider_calls() {
    let provider = Arc::new(StubProvider::default());
    let records = vec![TextRecord::new("tiny.com", "too short")];

    let matrix = SimilarityMatrixBuilder::new(100, "model-x")
        .build(&records, &embedder(&provider))
        .await
        .unwrap();

    assert!(matrix.is_empty());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_single_entity_is_one_by_one() {
    let body = text(120, 'x');
    let provider = Arc::new(StubProvider::default().with(&body, &[0.2, 0.9, 0.1]));
    let records = vec![TextRecord::new("solo.com", body)];

    let matrix = SimilarityMatrixBuilder::new(100, "model-x")
        .build(&records, &embedder(&provider))
        .await
        .unwrap();

    assert_eq!(matrix.len(), 1);
    assert_eq!(matrix.value_at(0, 0), Some(1.0));
}

#[tokio::test]
async fn test_shared_text_is_embedded_once() {
    let body = text(120, 's');
    let provider = Arc::new(StubProvider::default().with(&body, &[0.6, 0.8]));
    let records = vec![
        TextRecord::new("one.com", body.clone()),
        TextRecord::new("two.com", body),
    ];

    let matrix = SimilarityMatrixBuilder::new(100, "model-x")
        .with_concurrency(4)
        .build(&records, &embedder(&provider))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    let sim = matrix.get("one.com", "two.com").unwrap();
    assert!((sim - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_concurrent_build_preserves_input_order() {
    let mut provider = StubProvider::default();
    let mut records = Vec::new();
    for i in 0..12u8 {
        let body = text(101 + usize::from(i), char::from(b'a' + i));
        provider = provider.with(&body, &[1.0, f32::from(i)]);
        records.push(TextRecord::new(format!("d{i}.com"), body));
    }
    let provider = Arc::new(provider);

    let matrix = SimilarityMatrixBuilder::new(100, "model-x")
        .with_concurrency(5)
        .build(&records, &embedder(&provider))
        .await
        .unwrap();

    let expected: Vec<String> = (0..12).map(|i| format!("d{i}.com")).collect();
    assert_eq!(matrix.labels(), expected.as_slice());
}

#[tokio::test]
async fn test_provider_failure_aborts_with_entity() {
    let good = text(120, 'g');
    let provider = Arc::new(StubProvider::default().with(&good, &[1.0, 0.0]));
    let records = vec![
        TextRecord::new("good.com", good),
        TextRecord::new("bad.com", text(120, 'b')),
    ];

    let err = SimilarityMatrixBuilder::new(100, "model-x")
        .build(&records, &embedder(&provider))
        .await
        .unwrap_err();

    assert_eq!(err.entity(), Some("bad.com"));
    match err {
        PipelineError::Embedding { source, .. } => {
            assert!(source.is_provider_error());
            assert!(source.cache_key().is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_out_of_range_cached_vector_fails_as_corruption() {
    let a = text(120, 'a');
    let b = text(120, 'b');
    let provider = Arc::new(StubProvider::default());
    let store = Arc::new(MemoryStore::new());
    let embedder = CachedEmbedder::new(provider.clone(), store.clone());
    store
        .put(&embedder.key_for("m", &a), b"[1e39, 1.0]")
        .await
        .unwrap();
    store
        .put(&embedder.key_for("m", &b), b"[1.0, 0.0]")
        .await
        .unwrap();
    let records = vec![TextRecord::new("a.com", a), TextRecord::new("b.com", b)];

    let err = SimilarityMatrixBuilder::new(100, "m")
        .build(&records, &embedder)
        .await
        .unwrap_err();

    assert_eq!(provider.calls(), 0);
    match err {
        PipelineError::Embedding { entity, source } => {
            assert_eq!(entity, "a.com");
            assert!(matches!(source, EmbeddingError::CacheCorruption { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_isolated_failures_drop_entity() {
    let good = text(120, 'g');
    let other = text(130, 'o');
    let provider = Arc::new(
        StubProvider::default()
            .with(&good, &[1.0, 0.0])
            .with(&other, &[0.0, 1.0]),
    );
    let records = vec![
        TextRecord::new("good.com", good),
        TextRecord::new("bad.com", text(120, 'b')),
        TextRecord::new("other.com", other),
    ];

    let matrix = SimilarityMatrixBuilder::new(100, "model-x")
        .with_isolated_failures(true)
        .build(&records, &embedder(&provider))
        .await
        .unwrap();

    assert_eq!(matrix.labels(), ["good.com", "other.com"]);
}

#[tokio::test]
async fn test_degenerate_vector_fails_without_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let good = text(120, 'g');
    let zero = text(120, 'z');
    let provider = Arc::new(
        StubProvider::default()
            .with(&good, &[1.0, 0.0])
            .with(&zero, &[0.0, 0.0]),
    );

    let domains_path = dir.path().join("domains.txt");
    std::fs::write(&domains_path, "good.com\nzero.com\n").unwrap();
    let texts = HashMap::from([
        ("good.com".to_string(), good),
        ("zero.com".to_string(), zero),
    ]);

    let mut config = PipelineConfig::default();
    config.output = OutputConfig {
        path: dir.path().join("out/similarity_matrix.csv"),
        ..OutputConfig::default()
    };
    let output_path = config.output.path.clone();
    let pipeline = Pipeline::new(
        config,
        Arc::new(BasicDomainCleaner),
        Arc::new(JsonTextSource::from_map(texts)),
        Arc::new(embedder(&provider)),
    );

    let err = pipeline.run(&domains_path).await.unwrap_err();

    assert!(matches!(err, PipelineError::DegenerateVector { ref entity } if entity == "zero.com"));
    assert!(!output_path.exists());
}

#[tokio::test]
async fn test_run_from_config_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [0.5, 0.5, 0.1], "index": 0}],
            "model": "model-x"
        })))
        // Two distinct texts on the first run, none on the second.
        .expect(2)
        .mount(&server)
        .await;

    let domains_path = dir.path().join("domains.txt");
    std::fs::write(
        &domains_path,
        "https://www.alpha.com/\nbeta.io\nalpha.com\nnotext.org\nshort.net\n",
    )
    .unwrap();
    let texts_path = dir.path().join("texts.json");
    std::fs::write(
        &texts_path,
        serde_json::to_string(&serde_json::json!({
            "alpha.com": text(150, 'a'),
            "beta.io": format!("{}\n{}", text(80, 'b'), text(80, 'b')),
            "short.net": "tiny",
        }))
        .unwrap(),
    )
    .unwrap();

    let mut config = PipelineConfig::default()
        .with_model("model-x")
        .with_cache_root(dir.path())
        .with_source(SourceConfig::Json { path: texts_path })
        .with_output_path(dir.path().join("out/matrix.csv"));
    config.provider = config
        .provider
        .clone()
        .with_api_key("sk-test")
        .with_base_url(server.uri());

    let first = Pipeline::from_config(config.clone())
        .await
        .unwrap()
        .run(&domains_path)
        .await
        .unwrap();
    assert_eq!(first.domains_read, 5);
    assert_eq!(first.domains_unique, 4);
    assert_eq!(first.records, 3);
    assert_eq!(first.entities, 2);
    assert_eq!(first.embeddings.provider_calls, 2);

    let written = std::fs::read_to_string(dir.path().join("out/matrix.csv")).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines[0], ",alpha.com,beta.io");
    assert_eq!(lines.len(), 3);

    let second = Pipeline::from_config(config)
        .await
        .unwrap()
        .run(&domains_path)
        .await
        .unwrap();
    assert_eq!(second.embeddings.provider_calls, 0);
    assert_eq!(second.embeddings.cache_hits, 2);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("out/matrix.csv")).unwrap(),
        written
    );
}
