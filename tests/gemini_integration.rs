//! The Gemini generator against a local mock of the `generateContent` API.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use film_rag::config::GenerationConfig;
use film_rag::error::RagError;
use film_rag::generation::{AnswerGenerator, GeminiGenerator};
use film_rag::models::SourcePassage;

const API_KEY: &str = "test-gemini-key";

/// (x-goog-api-key header, request body) for every call the mock received.
type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

// ─── Mock server ────────────────────────────────────────────────────

fn record(seen: &Seen, headers: &HeaderMap, body: Value) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.lock().unwrap().push((key, body));
}

async fn quota(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record(&seen, &headers, body);
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"error": {"code": 429, "message": "Resource has been exhausted"}})),
    )
}

async fn answer(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record(&seen, &headers, body);
    Json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": "Diane dreams "}, {"text": "she is Betty."}]},
            "finishReason": "STOP"
        }]
    }))
}

async fn empty(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record(&seen, &headers, body);
    Json(json!({}))
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn spawn_mock(seen: Seen) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/quota/models/{*action}", post(quota))
        .route("/answer/models/{*action}", post(answer))
        .route("/empty/models/{*action}", post(empty))
        .with_state(seen);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (base, handle)
}

fn generator(base_url: &str) -> GeminiGenerator {
    let config = GenerationConfig {
        provider: "gemini".to_string(),
        timeout_secs: 5,
        ..Default::default()
    };
    GeminiGenerator::with_base_url(&config, API_KEY, base_url).unwrap()
}

fn passages() -> Vec<SourcePassage> {
    vec![SourcePassage {
        id: "corpus.txt::chunk_7".to_string(),
        text: "Diane Selwyn dreams a life as Betty Elms.".to_string(),
        score: 0.82,
        metadata: Value::Null,
    }]
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_gemini_joins_answer_parts_and_sends_key() {
    let seen: Seen = Arc::default();
    let (base, server) = spawn_mock(seen.clone()).await;

    let answer = generator(&format!("{}/answer", base))
        .generate("Who is Betty?", &passages())
        .await
        .unwrap();
    assert_eq!(answer, "Diane dreams she is Betty.");

    let calls = seen.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.as_deref(), Some(API_KEY));
    let prompt = calls[0].1["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap();
    assert!(prompt.contains("Diane Selwyn dreams a life as Betty Elms."));
    assert!(prompt.ends_with("User question:\nWho is Betty?"));

    server.abort();
}

#[tokio::test]
async fn test_gemini_quota_is_provider_unavailable() {
    let seen: Seen = Arc::default();
    let (base, server) = spawn_mock(seen.clone()).await;

    let err = generator(&format!("{}/quota", base))
        .generate("Who is Betty?", &passages())
        .await
        .unwrap_err();
    match err {
        RagError::ProviderUnavailable { provider, message } => {
            assert_eq!(provider, "gemini");
            assert!(message.contains("429"), "got: {}", message);
        }
        other => panic!("expected ProviderUnavailable, got {:?}", other),
    }
    // No retries for generation.
    assert_eq!(seen.lock().unwrap().len(), 1);

    server.abort();
}

#[tokio::test]
async fn test_gemini_empty_body_is_generation_error() {
    let seen: Seen = Arc::default();
    let (base, server) = spawn_mock(seen).await;

    let err = generator(&format!("{}/empty", base))
        .generate("Who is Betty?", &passages())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Generation { .. }), "got: {:?}", err);

    server.abort();
}

#[tokio::test]
async fn test_gemini_unreachable_is_provider_unavailable() {
    let port = find_free_port();
    let err = generator(&format!("http://127.0.0.1:{}", port))
        .generate("Who is Betty?", &passages())
        .await
        .unwrap_err();
    assert!(
        matches!(err, RagError::ProviderUnavailable { .. }),
        "got: {:?}",
        err
    );
}
