//! HTTP client tests against fake embedding and NER services.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adrenaline_rag::{
    DistanceMetric, EmbeddingProvider, EntityExtractor, HttpEmbeddingClient, InMemoryNoteIndex,
    NerClient, RagConfig, RagError, RetrievalPipeline, RetryPolicy, SearchScope,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct FakeService {
    calls: Arc<AtomicUsize>,
    /// Number of leading requests answered with 503.
    failures: usize,
    /// Time taken to answer each request.
    delay: Duration,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl FakeService {
    fn failing_first(failures: usize) -> Self {
        Self { failures, ..Self::default() }
    }

    fn answering_after(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    /// Count the call, then fail it if it is within the failure window.
    fn record(&self, body: Value) -> Result<(), StatusCode> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().unwrap().push(body);
        if n < self.failures { Err(StatusCode::SERVICE_UNAVAILABLE) } else { Ok(()) }
    }
}

async fn embeddings(
    State(svc): State<FakeService>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    svc.record(body.clone())?;
    let count = body["texts"].as_array().map(Vec::len).unwrap_or(0);
    let vectors: Vec<Vec<f32>> = (0..count).map(|i| vec![i as f32, 1.0, 0.5]).collect();
    Ok(Json(json!({ "embeddings": vectors })))
}

/// Reports every occurrence of "aspirin" with chunk-local character offsets.
async fn extract_entities(
    State(svc): State<FakeService>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    svc.record(body.clone())?;
    tokio::time::sleep(svc.delay).await;
    let text = body["text"].as_str().unwrap_or_default();
    let chars: Vec<char> = text.chars().collect();
    let needle: Vec<char> = "aspirin".chars().collect();
    let entities: Vec<Value> = (0..chars.len())
        .filter(|&i| chars[i..].starts_with(&needle))
        .map(|i| {
            json!({
                "pretty_name": "Aspirin",
                "cui": "C0004057",
                "types": ["Pharmacologic Substance"],
                "start": i,
                "end": i + needle.len(),
            })
        })
        .collect();
    Ok(Json(json!({ "entities": entities })))
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn embedding_service(svc: FakeService) -> String {
    spawn(Router::new().route("/embeddings", post(embeddings)).with_state(svc)).await
}

async fn ner_service(svc: FakeService) -> String {
    spawn(Router::new().route("/extract_entities", post(extract_entities)).with_state(svc)).await
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn embedding_request_carries_texts_and_instruction() {
    let svc = FakeService::default();
    let url = embedding_service(svc.clone()).await;
    let client = HttpEmbeddingClient::new(&url, Duration::from_secs(5)).unwrap();

    let vectors =
        client.embed_batch(&["chest pain", "aspirin"], "Represent the query:").await.unwrap();

    assert_eq!(vectors, vec![vec![0.0, 1.0, 0.5], vec![1.0, 1.0, 0.5]]);
    assert_eq!(
        svc.bodies(),
        vec![json!({ "texts": ["chest pain", "aspirin"], "instruction": "Represent the query:" })]
    );
}

#[tokio::test]
async fn embedding_rejects_empty_text_without_calling_the_service() {
    let svc = FakeService::default();
    let url = embedding_service(svc.clone()).await;
    let client = HttpEmbeddingClient::new(&url, Duration::from_secs(5)).unwrap();

    let err = client.embed("  ", "Represent the query:").await.unwrap_err();

    assert!(matches!(err, RagError::InvalidInput(_)));
    assert_eq!(svc.call_count(), 0);
}

#[tokio::test]
async fn embedding_recovers_after_one_transient_failure() {
    let svc = FakeService::failing_first(1);
    let url = embedding_service(svc.clone()).await;
    let client =
        HttpEmbeddingClient::new(&url, Duration::from_secs(5)).unwrap().with_retry(fast_retry(1));

    let vector = client.embed("chest pain", "Represent the query:").await.unwrap();

    assert_eq!(vector, vec![0.0, 1.0, 0.5]);
    assert_eq!(svc.call_count(), 2);
}

#[tokio::test]
async fn embedding_gives_up_after_bounded_retries() {
    let svc = FakeService::failing_first(usize::MAX);
    let url = embedding_service(svc.clone()).await;
    let client =
        HttpEmbeddingClient::new(&url, Duration::from_secs(5)).unwrap().with_retry(fast_retry(1));

    let err = client.embed("chest pain", "Represent the query:").await.unwrap_err();

    assert!(matches!(err, RagError::ServiceUnavailable { ref service, .. } if service == "embedding"));
    assert_eq!(svc.call_count(), 2);
}

#[tokio::test]
async fn unreachable_embedding_service_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let client = HttpEmbeddingClient::new(&url, Duration::from_secs(2))
        .unwrap()
        .with_retry(RetryPolicy::none());

    let err = client.embed("chest pain", "Represent the query:").await.unwrap_err();

    assert!(err.is_retryable());
}

#[tokio::test]
async fn ner_offsets_refer_to_the_original_text_across_chunks() {
    let svc = FakeService::default();
    let url = ner_service(svc.clone()).await;
    let client =
        NerClient::new(&url, Duration::from_secs(5)).unwrap().with_max_chunk_chars(20);

    let text = "Pt on aspirin daily. Résumé notes aspirin allergy denied.";
    let mentions = client.extract_mentions(text).await.unwrap();

    assert!(svc.call_count() > 1, "text should have been split");
    let chars: Vec<char> = text.chars().collect();
    assert_eq!(mentions.len(), 2);
    for mention in &mentions {
        let span: String = chars[mention.start..mention.end].iter().collect();
        assert_eq!(span, "aspirin");
    }
    assert_eq!(mentions[0].start, 6);

    let entities = client.extract(text).await.unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities.keys().next().unwrap().as_str(), "c0004057");
}

#[tokio::test]
async fn ner_skips_empty_text() {
    let svc = FakeService::default();
    let url = ner_service(svc.clone()).await;
    let client = NerClient::new(&url, Duration::from_secs(5)).unwrap();

    let entities = client.extract("   ").await.unwrap();

    assert!(entities.is_empty());
    assert_eq!(svc.call_count(), 0);
}

#[tokio::test]
async fn ner_retries_transient_failures() {
    let svc = FakeService::failing_first(1);
    let url = ner_service(svc.clone()).await;
    let client = NerClient::new(&url, Duration::from_secs(5)).unwrap().with_retry(fast_retry(1));

    let entities = client.extract("aspirin 81mg").await.unwrap();

    assert_eq!(entities.len(), 1);
    assert_eq!(svc.call_count(), 2);
}

#[tokio::test]
async fn long_note_is_kept_when_every_chunk_request_is_within_the_timeout() {
    let svc = FakeService::answering_after(Duration::from_millis(400));
    let url = ner_service(svc.clone()).await;
    let config = RagConfig::builder()
        .extraction_timeout(Duration::from_secs(1))
        .max_chunk_chars(20)
        .build()
        .unwrap();
    let ner = NerClient::new(&url, config.extraction_timeout)
        .unwrap()
        .with_max_chunk_chars(config.max_chunk_chars)
        .with_chunk_concurrency(1);

    let text = "Seen in clinic today for follow up. Intermittent chest discomfort, takes aspirin.";
    let index = InMemoryNoteIndex::new(DistanceMetric::InnerProduct);
    index.insert(common::note(123, "long", text, vec![1.0, 0.0], 0)).await;

    let pipeline = RetrievalPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(common::StaticEmbedder::new(vec![1.0, 0.0])))
        .vector_index(Arc::new(index))
        .entity_extractor(Arc::new(ner))
        .build()
        .unwrap();

    let result = pipeline.retrieve_context("aspirin", SearchScope::patient(123), 5).await.unwrap();

    // One query request plus one request per chunk, sent one after another,
    // together take longer than a single request's timeout.
    assert!(svc.call_count() >= 4);
    assert_eq!(result.len(), 1);
    assert_eq!(result.candidates[0].matching_entities[0].as_str(), "c0004057");
}

#[tokio::test]
async fn chunk_requests_run_concurrently_and_keep_text_order() {
    let svc = FakeService::answering_after(Duration::from_millis(200));
    let url = ner_service(svc.clone()).await;
    let client = NerClient::new(&url, Duration::from_secs(5))
        .unwrap()
        .with_max_chunk_chars(16)
        .with_chunk_concurrency(8);

    let text = "aspirin started. then aspirin held. aspirin resumed.";
    let started = std::time::Instant::now();
    let mentions = client.extract_mentions(text).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(600));
    let starts: Vec<usize> = mentions.iter().map(|m| m.start).collect();
    assert_eq!(starts, [0, 22, 36]);
}
