// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end tests for both transports against a local mock server.
//!
//! Each scenario runs through the raw SSE transport and the managed event
//! source and checks that they yield identical event sequences.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use parley_model::{
    ApiError, Endpoint, ManagedTransport, RawSseTransport, StopReason, StreamEvent,
    StreamRequest, Transport, WireMessage,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn sse_body(deltas: &[&str], stop_reason: &str) -> String {
    let mut body = String::from(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":5}}}\n\n",
    );
    for d in deltas {
        let ev = serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": d }
        });
        body.push_str(&format!("event: content_block_delta\ndata: {ev}\n\n"));
    }
    body.push_str(&format!(
        "event: message_delta\ndata: {{\"type\":\"message_delta\",\"delta\":{{\"stop_reason\":\"{stop_reason}\"}}}}\n\n"
    ));
    body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    body
}

fn request(headers: BTreeMap<String, String>) -> StreamRequest {
    StreamRequest {
        model: "test-model".into(),
        max_tokens: 256,
        system: "be brief".into(),
        messages: vec![WireMessage::user("hello")],
        headers,
    }
}

fn transports(server: &MockServer) -> Vec<Arc<dyn Transport>> {
    let ep = Endpoint::new(server.uri(), "test-key", "2023-06-01");
    vec![
        Arc::new(RawSseTransport::new(ep.clone())),
        Arc::new(ManagedTransport::new(ep)),
    ]
}

async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

async fn collect(
    transport: &dyn Transport,
    req: StreamRequest,
) -> Result<Vec<Result<StreamEvent, ApiError>>, ApiError> {
    let stream = transport.open(req).await?;
    Ok(stream.collect().await)
}

// ── Streaming ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn both_transports_yield_identical_deltas() {
    let server = MockServer::start().await;
    mount_stream(&server, sse_body(&["Hel", "lo", " there"], "end_turn")).await;

    let expected = vec![
        Ok(StreamEvent::ContentDelta("Hel".into())),
        Ok(StreamEvent::ContentDelta("lo".into())),
        Ok(StreamEvent::ContentDelta(" there".into())),
        Ok(StreamEvent::MessageDelta { stop_reason: Some(StopReason::EndTurn) }),
    ];
    for t in transports(&server) {
        let events = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap();
        assert_eq!(events, expected, "transport {}", t.name());
    }
}

#[tokio::test]
async fn max_tokens_stop_reason_is_reported() {
    let server = MockServer::start().await;
    mount_stream(&server, sse_body(&["cut"], "max_tokens")).await;

    for t in transports(&server) {
        let events = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap();
        assert_eq!(
            events.last().unwrap(),
            &Ok(StreamEvent::MessageDelta { stop_reason: Some(StopReason::MaxTokens) }),
            "transport {}",
            t.name()
        );
    }
}

#[tokio::test]
async fn malformed_event_does_not_abort_the_stream() {
    let server = MockServer::start().await;
    let body = format!(
        "{}data: {{\"type\":\"content_block_delta\",\"delta\":\n\n{}",
        sse_body(&["a"], "end_turn").replace("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n", ""),
        sse_body(&["b"], "end_turn"),
    );
    mount_stream(&server, body).await;

    for t in transports(&server) {
        let events = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap();
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::ContentDelta(d)) => Some(d.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "ab", "transport {}", t.name());
        assert!(events.iter().all(|e| e.is_ok()));
    }
}

#[tokio::test]
async fn request_body_carries_model_budget_and_stream_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-model",
            "max_tokens": 256,
            "system": "be brief",
            "stream": true,
            "messages": [{ "role": "user", "content": "hello" }]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&["ok"], "end_turn"), "text/event-stream"),
        )
        .expect(2)
        .mount(&server)
        .await;

    for t in transports(&server) {
        let events = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap();
        assert_eq!(events[0], Ok(StreamEvent::ContentDelta("ok".into())));
    }
}

#[tokio::test]
async fn raw_transport_sends_capability_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("anthropic-beta", "output-128k-2025-02-19"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&["beta"], "end_turn"), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ep = Endpoint::new(server.uri(), "test-key", "2023-06-01");
    let raw = RawSseTransport::new(ep);
    let mut headers = BTreeMap::new();
    headers.insert("anthropic-beta".to_string(), "output-128k-2025-02-19".to_string());
    let events = collect(&raw, request(headers)).await.unwrap();
    assert_eq!(events[0], Ok(StreamEvent::ContentDelta("beta".into())));
}

// ── Error classification ──────────────────────────────────────────────────────

async fn mount_status(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_string(), "application/json"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    mount_status(&server, 401, r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#).await;

    for t in transports(&server) {
        let err = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap_err();
        assert_eq!(err, ApiError::Auth, "transport {}", t.name());
    }
}

#[tokio::test]
async fn bad_request_surfaces_server_detail() {
    let server = MockServer::start().await;
    mount_status(&server, 400, r#"{"type":"error","error":{"type":"invalid_request_error","message":"messages: field required"}}"#).await;

    for t in transports(&server) {
        let err = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::BadRequest { detail: Some("messages: field required".into()) },
            "transport {}",
            t.name()
        );
    }
}

#[tokio::test]
async fn rate_limit_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    for t in transports(&server) {
        let err = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap_err();
        assert_eq!(err, ApiError::RateLimited, "transport {}", t.name());
    }
}

#[tokio::test]
async fn server_error_is_service_unavailable() {
    let server = MockServer::start().await;
    mount_status(&server, 503, "{}").await;

    for t in transports(&server) {
        let err = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap_err();
        assert_eq!(err, ApiError::ServiceUnavailable { status: 503 }, "transport {}", t.name());
    }
}

#[tokio::test]
async fn in_stream_error_event_terminates_with_error() {
    let server = MockServer::start().await;
    let body = format!(
        "{}event: error\ndata: {}\n\n",
        sse_body(&["partial"], "end_turn").replace("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n", ""),
        r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
    );
    mount_stream(&server, body).await;

    for t in transports(&server) {
        let events = collect(t.as_ref(), request(BTreeMap::new())).await.unwrap();
        assert_eq!(
            events.last().unwrap(),
            &Err(ApiError::ServiceUnavailable { status: 529 }),
            "transport {}",
            t.name()
        );
    }
}
