use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use claude_gateway::config::{ProviderConfig, ProxyConfig};
use claude_gateway::providers::WireFormat;
use claude_gateway::translate::TranscoderRegistry;
use claude_gateway::{build_router, AppState, KeyPool};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

// ────────────────────────────────────────────────────────────────
// Mock upstream
// ────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Upstream {
    /// (authorization header, request body) per call
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

const TEXT_STREAM: &[&str] = &[
    r#"{"id":"chatcmpl-s1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
    r#"{"id":"chatcmpl-s1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
    r#"{"id":"chatcmpl-s1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":" world"},"finish_reason":null}]}"#,
    r#"{"id":"chatcmpl-s1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#,
];

const TOOL_STREAM: &[&str] = &[
    r#"{"id":"chatcmpl-t1","choices":[{"index":0,"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_weather","arguments":""}}]},"finish_reason":null}]}"#,
    r#"{"id":"chatcmpl-t1","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]},"finish_reason":null}]}"#,
    r#"{"id":"chatcmpl-t1","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"London\"}"}}]},"finish_reason":null}]}"#,
    r#"{"id":"chatcmpl-t1","choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
];

fn sse_body(chunks: &[&str], done: bool) -> Response {
    let mut body: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn mock_chat_completions(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    upstream.calls.lock().unwrap().push((auth, body.clone()));

    let model = body["model"].as_str().unwrap_or_default();
    let streaming = body["stream"].as_bool().unwrap_or(false);

    match (model, streaming) {
        ("rate-limited", _) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "Slow down", "type": "rate_limit_exceeded", "code": 429}})),
        )
            .into_response(),
        ("truncated", true) => sse_body(&TEXT_STREAM[..2], true),
        ("tools", true) => sse_body(TOOL_STREAM, true),
        (_, true) => sse_body(TEXT_STREAM, true),
        (_, false) => Json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 0,
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello! I can help you with that."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        }))
        .into_response(),
    }
}

async fn mock_messages(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    Json(json!({
        "echo_model": body["model"],
        "x_api_key": header("x-api-key"),
        "anthropic_version": header("anthropic-version"),
    }))
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_upstream() -> (SocketAddr, Upstream) {
    let upstream = Upstream::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(mock_chat_completions))
        .route("/v1/messages", post(mock_messages))
        .with_state(upstream.clone());
    (spawn(app).await, upstream)
}

fn gateway_config(base_url: String, format: WireFormat) -> ProxyConfig {
    let mut models = HashMap::new();
    models.insert("claude-sonnet-4-20250514".to_string(), "gpt-4o".to_string());
    models.insert("claude-rate-limited".to_string(), "rate-limited".to_string());
    models.insert("claude-truncated".to_string(), "truncated".to_string());
    models.insert("claude-tools".to_string(), "tools".to_string());

    ProxyConfig {
        port: 0,
        timeout_secs: 30,
        provider: ProviderConfig {
            name: "mock".to_string(),
            base_url: Some(base_url),
            api_key_env: None,
            api_key_envs: Vec::new(),
            format: Some(format),
            transcoder: None,
        },
        models,
    }
}

async fn spawn_gateway(config: ProxyConfig) -> SocketAddr {
    let base_url = config.provider.base_url.clone().unwrap();
    let state = AppState {
        config,
        client: reqwest::Client::new(),
        registry: TranscoderRegistry::with_defaults(),
        keys: KeyPool::new("mock", vec!["key-a".to_string(), "key-b".to_string()]),
        base_url,
    };
    spawn(build_router(Arc::new(state))).await
}

async fn transcoding_gateway() -> (SocketAddr, Upstream) {
    let (upstream_addr, upstream) = spawn_upstream().await;
    let gateway = spawn_gateway(gateway_config(
        format!("http://{upstream_addr}/v1"),
        WireFormat::OpenAi,
    ))
    .await;
    (gateway, upstream)
}

fn messages_body(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "max_tokens": 1024,
        "stream": stream,
        "system": "Be brief.",
        "messages": [{"role": "user", "content": "Hello, how are you?"}]
    })
}

async fn post_messages(gateway: SocketAddr, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{gateway}/v1/messages"))
        .header("anthropic-version", "2023-06-01")
        .json(body)
        .send()
        .await
        .unwrap()
}

/// Split an SSE body into (event name, data JSON) pairs.
fn parse_frames(body: &str) -> Vec<(String, Value)> {
    body.split_terminator("\n\n")
        .map(|frame| {
            let mut lines = frame.lines();
            let event = lines.next().unwrap().strip_prefix("event: ").unwrap();
            let data = lines.next().unwrap().strip_prefix("data: ").unwrap();
            (event.to_string(), serde_json::from_str(data).unwrap())
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────
// Transcoding
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_streaming_roundtrip() {
    let (gateway, upstream) = transcoding_gateway().await;

    let resp = post_messages(gateway, &messages_body("claude-sonnet-4-20250514", false)).await;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "msg_chatcmpl-123");
    assert_eq!(body["type"], "message");
    assert_eq!(body["model"], "claude-sonnet-4-20250514");
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["stop_sequence"], Value::Null);
    assert_eq!(
        body["content"],
        json!([{"type": "text", "text": "Hello! I can help you with that.", "citations": null}])
    );
    assert_eq!(body["usage"]["input_tokens"], 10);
    assert_eq!(body["usage"]["output_tokens"], 20);

    let calls = upstream.calls.lock().unwrap();
    let (auth, sent) = &calls[0];
    assert_eq!(auth, "Bearer key-a");
    assert_eq!(sent["model"], "gpt-4o");
    assert_eq!(sent["max_completion_tokens"], 1024);
    assert_eq!(
        sent["messages"],
        json!([
            {"role": "system", "content": "Be brief."},
            {"role": "user", "content": "Hello, how are you?"}
        ])
    );
}

#[tokio::test]
async fn test_keys_rotate_between_requests() {
    let (gateway, upstream) = transcoding_gateway().await;

    for _ in 0..3 {
        let resp = post_messages(gateway, &messages_body("claude-sonnet-4-20250514", false)).await;
        assert_eq!(resp.status(), 200);
    }

    let auths: Vec<String> = upstream
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(auth, _)| auth.clone())
        .collect();
    assert_eq!(auths, vec!["Bearer key-a", "Bearer key-b", "Bearer key-a"]);
}

#[tokio::test]
async fn test_streaming_text_frames() {
    let (gateway, _upstream) = transcoding_gateway().await;

    let resp = post_messages(gateway, &messages_body("claude-sonnet-4-20250514", true)).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["cache-control"], "no-cache");
    assert_eq!(resp.headers()["x-accel-buffering"], "no");

    let frames = parse_frames(&resp.text().await.unwrap());
    let names: Vec<&str> = frames.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop"
        ]
    );

    for (name, data) in &frames {
        assert_eq!(data["type"], name.as_str());
    }

    let start = &frames[0].1["message"];
    assert_eq!(start["id"], "msg_chatcmpl-s1");
    assert_eq!(start["model"], "claude-sonnet-4-20250514");
    assert_eq!(start["usage"]["input_tokens"], 0);

    assert_eq!(
        frames[1].1["content_block"],
        json!({"type": "text", "text": "", "citations": null})
    );
    assert_eq!(frames[2].1["delta"], json!({"type": "text_delta", "text": "Hello"}));
    assert_eq!(frames[5].1["delta"]["stop_reason"], "end_turn");
    assert_eq!(frames[5].1["usage"]["output_tokens"], 2);
    assert_eq!(frames[5].1["usage"]["input_tokens"], Value::Null);
}

#[tokio::test]
async fn test_streaming_tool_call_frames() {
    let (gateway, _upstream) = transcoding_gateway().await;

    let resp = post_messages(gateway, &messages_body("claude-tools", true)).await;
    let frames = parse_frames(&resp.text().await.unwrap());

    assert_eq!(
        frames[1].1["content_block"],
        json!({"type": "tool_use", "id": "call_1", "name": "get_weather", "input": {}})
    );

    let partial: String = frames
        .iter()
        .filter(|(name, _)| name == "content_block_delta")
        .map(|(_, data)| data["delta"]["partial_json"].as_str().unwrap().to_string())
        .collect();
    let input: Value = serde_json::from_str(&partial).unwrap();
    assert_eq!(input, json!({"city": "London"}));

    let delta = frames
        .iter()
        .find(|(name, _)| name == "message_delta")
        .unwrap();
    assert_eq!(delta.1["delta"]["stop_reason"], "tool_use");
    assert_eq!(frames.last().unwrap().0, "message_stop");
}

#[tokio::test]
async fn test_truncated_stream_never_reports_success() {
    let (gateway, _upstream) = transcoding_gateway().await;

    let resp = post_messages(gateway, &messages_body("claude-truncated", true)).await;
    assert_eq!(resp.status(), 200);

    // The body is aborted; whatever arrived must not look like a finished message.
    if let Ok(body) = resp.text().await {
        assert!(!body.contains("event: message_stop"));
        assert!(!body.contains("event: message_delta"));
    }
}

#[tokio::test]
async fn test_upstream_error_is_mapped() {
    let (gateway, _upstream) = transcoding_gateway().await;

    for stream in [false, true] {
        let resp = post_messages(gateway, &messages_body("claude-rate-limited", stream)).await;
        assert_eq!(resp.status(), 429);
        assert_eq!(resp.headers()["content-type"], "application/json");

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert_eq!(body["error"]["message"], "Slow down");
    }
}

#[tokio::test]
async fn test_invalid_body_is_rejected() {
    let (gateway, upstream) = transcoding_gateway().await;

    let resp = post_messages(gateway, &json!({"model": "claude-sonnet-4-20250514"})).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(upstream.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Bind and drop to get a port nothing listens on.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let gateway = spawn_gateway(gateway_config(format!("http://{addr}/v1"), WireFormat::OpenAi)).await;

    let resp = post_messages(gateway, &messages_body("claude-sonnet-4-20250514", false)).await;
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "api_error");
}

// ────────────────────────────────────────────────────────────────
// Pass-through and auxiliary endpoints
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_passthrough_forwards_request() {
    let (upstream_addr, upstream) = spawn_upstream().await;
    let gateway = spawn_gateway(gateway_config(
        format!("http://{upstream_addr}"),
        WireFormat::Anthropic,
    ))
    .await;

    let resp = post_messages(gateway, &messages_body("claude-opus-4", false)).await;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["echo_model"], "claude-opus-4");
    assert_eq!(body["x_api_key"], "key-a");
    assert_eq!(body["anthropic_version"], "2023-06-01");
    assert!(upstream.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_and_models() {
    let (gateway, _upstream) = transcoding_gateway().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{gateway}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["format"], "openai");

    let models: Value = client
        .get(format!("http://{gateway}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["object"], "list");
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![
            "claude-rate-limited",
            "claude-sonnet-4-20250514",
            "claude-tools",
            "claude-truncated"
        ]
    );
}
