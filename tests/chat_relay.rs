use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use chat_relay::config::{AppConfig, Credential};
use chat_relay::routing::dispatch::dispatch_request;
use chat_relay::state::AppState;
use serde_json::{json, Value};

/// What the mock provider saw: `Authorization` header and JSON body.
type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

struct MockUpstream {
    base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Seen,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Serve `/api/v1/chat/completions` answering with `status` and `chunks`
/// streamed one by one.
async fn spawn_upstream(status: StatusCode, chunks: Vec<&'static str>) -> MockUpstream {
    spawn_paced_upstream(status, chunks, Duration::ZERO, Duration::ZERO).await
}

/// Like [`spawn_upstream`], but holds the response headers back for
/// `header_delay` and waits `chunk_gap` before each body chunk.
async fn spawn_paced_upstream(
    status: StatusCode,
    chunks: Vec<&'static str>,
    header_delay: Duration,
    chunk_gap: Duration,
) -> MockUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));

    let handler_hits = Arc::clone(&hits);
    let handler_seen = Arc::clone(&seen);
    let app = Router::new().route(
        "/api/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let hits = Arc::clone(&handler_hits);
            let seen = Arc::clone(&handler_seen);
            let chunks = chunks.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                seen.lock().unwrap().push((auth, body));
                tokio::time::sleep(header_delay).await;

                let stream = futures_util::stream::iter(chunks).then(move |chunk| async move {
                    tokio::time::sleep(chunk_gap).await;
                    Ok::<Bytes, Infallible>(Bytes::from_static(chunk.as_bytes()))
                });
                Response::builder()
                    .status(status)
                    .header("content-type", "text/event-stream")
                    .body(Body::from_stream(stream))
                    .unwrap()
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream {
        base_url: format!("http://{addr}/api/v1"),
        hits,
        seen,
        server,
    }
}

fn build_state(base_url: String, default_key: Option<&str>) -> Arc<AppState> {
    let mut config = AppConfig::default();
    config.upstream.base_url = base_url;
    config.upstream.api_key = default_key.map(Credential::new);
    Arc::new(AppState::from_config(config).expect("build state"))
}

fn chat_request(body: &Value, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json");
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("serialize request")))
        .expect("build request")
}

async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    (status, headers, body)
}

#[tokio::test]
async fn test_streaming_relay_end_to_end() {
    // Frames deliberately split mid-delimiter and mid-payload.
    let upstream = spawn_upstream(
        StatusCode::OK,
        vec![
            ": OPENROUTER PROCESSING\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n",
            "\ndata: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"llo\"}}]}\n\ndata: [DO",
            "NE]\n\n",
        ],
    )
    .await;
    let state = build_state(upstream.base_url.clone(), None);

    let (status, headers, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "apiKey": "k1", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(
        body,
        Bytes::from_static(b"data: He\n\ndata: llo\n\ndata: [DONE]\n\n")
    );

    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
    let seen = upstream.seen.lock().unwrap();
    let (auth, sent) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer k1"));
    assert_eq!(sent["model"], "openai/gpt-3.5-turbo");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][0]["content"], "You are a helpful AI assistant.");
    assert_eq!(sent["messages"][1]["content"], "hi");
}

#[tokio::test]
async fn test_streaming_without_marker_gets_synthesized_done() {
    let upstream = spawn_upstream(
        StatusCode::OK,
        vec!["data: {\"choices\":[{\"delta\":{\"content\":\"only\"}}]}\n\n"],
    )
    .await;
    let state = build_state(upstream.base_url.clone(), None);

    let (status, _, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "apiKey": "k1", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"data: only\n\ndata: [DONE]\n\n"));
}

#[tokio::test]
async fn test_streaming_ignores_frames_after_done() {
    let upstream = spawn_upstream(
        StatusCode::OK,
        vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\ndata: [DONE]\n\n",
        ],
    )
    .await;
    let state = build_state(upstream.base_url.clone(), None);

    let (_, _, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "apiKey": "k1", "stream": true}), None),
    )
    .await;

    assert_eq!(body, Bytes::from_static(b"data: a\n\ndata: [DONE]\n\n"));
}

#[tokio::test]
async fn test_empty_prompt_rejected_without_upstream_call() {
    let upstream = spawn_upstream(StatusCode::OK, vec!["data: [DONE]\n\n"]).await;
    let state = build_state(upstream.base_url.clone(), Some("sk-default"));

    let (status, _, body) = send(
        state,
        chat_request(&json!({"prompt": "   ", "apiKey": "k1", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload, json!({"error": "Prompt is required."}));
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_credential_rejected_without_upstream_call() {
    let upstream = spawn_upstream(StatusCode::OK, vec!["data: [DONE]\n\n"]).await;
    let state = build_state(upstream.base_url.clone(), None);

    let (status, _, body) = send(state, chat_request(&json!({"prompt": "hi"}), None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload, json!({"error": "API key is required."}));
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_json_body_rejected() {
    let state = build_state("http://127.0.0.1:9/api/v1".to_string(), Some("sk-default"));
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .body(Body::from("{not json"))
        .expect("build request");

    let (status, _, body) = send(state, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload, json!({"error": "Invalid JSON body."}));
}

#[tokio::test]
async fn test_default_credential_used_when_caller_sends_none() {
    let upstream = spawn_upstream(StatusCode::OK, vec!["data: [DONE]\n\n"]).await;
    let state = build_state(upstream.base_url.clone(), Some("sk-default"));

    let (status, _, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "role": "pirate", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"data: [DONE]\n\n"));
    let seen = upstream.seen.lock().unwrap();
    assert_eq!(seen[0].0.as_deref(), Some("Bearer sk-default"));
    assert_eq!(
        seen[0].1["messages"][0]["content"],
        "You are a helpful AI assistant acting as a pirate."
    );
}

#[tokio::test]
async fn test_connect_failure_returns_500_with_details() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let state = build_state(format!("http://{addr}/api/v1"), None);

    let (status, headers, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "apiKey": "k1", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers["content-type"], "application/json");
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["error"], "Failed to fetch AI response");
    assert!(payload["details"].as_str().is_some_and(|d| !d.is_empty()));
    assert!(!String::from_utf8_lossy(&body).contains("data:"));
}

fn build_state_with_handshake_timeout(base_url: String, secs: u64) -> Arc<AppState> {
    let mut config = AppConfig::default();
    config.upstream.base_url = base_url;
    config.upstream.stream_handshake_timeout_secs = secs;
    Arc::new(AppState::from_config(config).expect("build state"))
}

#[tokio::test]
async fn test_stalled_handshake_fails_before_streaming() {
    let upstream = spawn_paced_upstream(
        StatusCode::OK,
        vec!["data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n"],
        Duration::from_secs(3),
        Duration::ZERO,
    )
    .await;
    let state = build_state_with_handshake_timeout(upstream.base_url.clone(), 1);

    let (status, headers, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "apiKey": "k1", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers["content-type"], "application/json");
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(
        payload,
        json!({"error": "Failed to fetch AI response", "details": "Upstream request timed out"})
    );
    assert!(!String::from_utf8_lossy(&body).contains("data:"));
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_body_outlives_handshake_timeout() {
    // Headers arrive at once; the body takes about 1.8 s in total.
    let upstream = spawn_paced_upstream(
        StatusCode::OK,
        vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"slow\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ly\"}}]}\n\n",
            "data: [DONE]\n\n",
        ],
        Duration::ZERO,
        Duration::from_millis(600),
    )
    .await;
    let state = build_state_with_handshake_timeout(upstream.base_url.clone(), 1);

    let (status, _, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "apiKey": "k1", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        Bytes::from_static(b"data: slow\n\ndata: ly\n\ndata: [DONE]\n\n")
    );
}

#[tokio::test]
async fn test_upstream_error_status_returns_500_with_summary() {
    let upstream = spawn_upstream(
        StatusCode::UNAUTHORIZED,
        vec![r#"{"error":{"message":"No auth credentials found","code":401}}"#],
    )
    .await;
    let state = build_state(upstream.base_url.clone(), None);

    let (status, _, body) = send(
        state,
        chat_request(&json!({"prompt": "hi", "apiKey": "bad", "stream": true}), None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["error"], "Failed to fetch AI response");
    assert_eq!(payload["details"], "No auth credentials found");
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_streaming_reply() {
    let upstream = spawn_upstream(
        StatusCode::OK,
        vec![r#"{"id":"gen-1","choices":[{"index":0,"message":{"role":"assistant","content":"pong"},"finish_reason":"stop"}]}"#],
    )
    .await;
    let state = build_state(upstream.base_url.clone(), None);

    let (status, _, body) = send(
        state,
        chat_request(&json!({"prompt": "ping", "apiKey": "k1"}), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload, json!({"response": "pong"}));
    assert_eq!(upstream.seen.lock().unwrap()[0].1["stream"], false);
}

#[tokio::test]
async fn test_cors_headers_on_chat_response() {
    let upstream = spawn_upstream(StatusCode::OK, vec!["data: [DONE]\n\n"]).await;
    let state = build_state(upstream.base_url.clone(), None);

    let (_, headers, _) = send(
        state,
        chat_request(
            &json!({"prompt": "hi", "apiKey": "k1", "stream": true}),
            Some("https://speech-rho.vercel.app"),
        ),
    )
    .await;

    assert_eq!(
        headers["access-control-allow-origin"],
        "https://speech-rho.vercel.app"
    );
}

#[tokio::test]
async fn test_preflight_allowed_and_denied_origins() {
    let state = build_state("http://127.0.0.1:9/api/v1".to_string(), None);

    let preflight = |origin: &'static str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/api/chat")
            .header("origin", origin)
            .body(Body::empty())
            .expect("build request")
    };

    let (status, headers, body) =
        send(Arc::clone(&state), preflight("http://localhost:3000")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers["access-control-allow-origin"], "http://localhost:3000");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(
        headers["access-control-allow-headers"],
        "Content-Type, Authorization"
    );

    let (status, headers, _) = send(state, preflight("https://evil.example")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_welcome_and_health_routes() {
    let state = build_state("http://127.0.0.1:9/api/v1".to_string(), Some("sk-secret"));

    let request = Request::builder()
        .method("GET")
        .uri("/api/chat")
        .body(Body::empty())
        .expect("build request");
    let (status, _, body) = send(Arc::clone(&state), request).await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload, json!({"message": "Welcome to the OpenRouter Chat API!"}));

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .expect("build request");
    let (status, _, body) = send(Arc::clone(&state), request).await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["config"]["default_credential_configured"], true);
    assert!(!String::from_utf8_lossy(&body).contains("sk-secret"));

    let request = Request::builder()
        .method("GET")
        .uri("/v1/models")
        .body(Body::empty())
        .expect("build request");
    let (status, _, _) = send(state, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
