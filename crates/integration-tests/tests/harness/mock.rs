//! Canned provider backends on top of `wiremock`

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Render events as a server-sent event body
///
/// Anthropic events carry an `event:` line named after their `type`.
pub fn sse_body(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| match event.get("type").and_then(Value::as_str) {
            Some(kind) => format!("event: {kind}\ndata: {event}\n\n"),
            None => format!("data: {event}\n\n"),
        })
        .collect()
}

/// Mount a blocking Anthropic Messages response
pub async fn anthropic_message(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a streaming Anthropic Messages response
pub async fn anthropic_stream(server: &MockServer, events: &[Value]) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(events), "text/event-stream"))
        .mount(server)
        .await;
}

/// Mount a blocking Gemini `generateContent` response
pub async fn gemini_generate(server: &MockServer, model: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{model}:generateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a streaming Gemini `streamGenerateContent` response
pub async fn gemini_stream(server: &MockServer, model: &str, chunks: &[Value]) {
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{model}:streamGenerateContent")))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(chunks), "text/event-stream"))
        .mount(server)
        .await;
}

/// The Anthropic event sequence for a plain text answer split into `deltas`
pub fn anthropic_text_events(deltas: &[&str], stop_reason: &str) -> Vec<Value> {
    let mut events = vec![
        json!({"type": "message_start", "message": {
            "id": "msg_it", "type": "message", "role": "assistant", "model": "claude-sonnet-4-5",
            "content": [], "usage": {"input_tokens": 7, "output_tokens": 0}
        }}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    ];
    events.extend(
        deltas
            .iter()
            .map(|text| json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})),
    );
    events.extend([
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": stop_reason}, "usage": {"output_tokens": 3}}),
        json!({"type": "message_stop"}),
    ]);
    events
}

/// JSON bodies of every request the server received
pub async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| request.body_json().ok())
        .collect()
}
