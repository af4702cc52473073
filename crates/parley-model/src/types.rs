// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::ApiError;

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role/content pair as sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }
}

/// Server-reported cause of response termination.
///
/// Serialized as the server's raw string so unknown reasons survive a
/// persistence round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    /// Natural end of the assistant turn (`end_turn`).
    EndTurn,
    /// Output hit the token ceiling (`max_tokens`); the reply is truncated.
    MaxTokens,
    /// Any other reason (`stop_sequence`, `refusal`, ...).
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::MaxTokens => "max_tokens",
            StopReason::Other(s) => s,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, StopReason::MaxTokens)
    }
}

impl From<String> for StopReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            _ => StopReason::Other(s),
        }
    }
}

impl From<&str> for StopReason {
    fn from(s: &str) -> Self {
        StopReason::from(s.to_string())
    }
}

impl From<StopReason> for String {
    fn from(r: StopReason) -> Self {
        match r {
            StopReason::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Streaming ────────────────────────────────────────────────────────────────

/// One event of a streamed response, common to every transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text fragment to append to the assistant reply
    ContentDelta(String),
    /// Message-level update; carries the stop reason when the server sends one
    MessageDelta { stop_reason: Option<StopReason> },
}

/// Everything a transport needs to open one streaming completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<WireMessage>,
    /// Capability-specific headers (raw transport only)
    pub headers: BTreeMap<String, String>,
}

impl StreamRequest {
    /// JSON body of the completion request.
    pub fn to_body(&self) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": self.messages,
            "system": self.system,
            "stream": true,
        })
    }
}

/// Where and how to reach the completion endpoint.
#[derive(Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    pub api_version: String,
}

impl Endpoint {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: api_version.into(),
        }
    }

    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

// The key never reaches logs or panic messages.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

// ─── Event parsing ────────────────────────────────────────────────────────────

/// Parse the payload of one SSE `data:` field.
///
/// Returns `None` for empty payloads, unparseable JSON, and event kinds that
/// carry nothing for the reply (`ping`, `message_start`, ...).  In-stream
/// `error` events come back as `Some(Err(_))`.
pub fn parse_data(data: &str) -> Option<Result<StreamEvent, ApiError>> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) => parse_event(&v),
        Err(e) => {
            debug!(error = %e, "skipping malformed event");
            None
        }
    }
}

/// Parse one complete SSE line.  Lines without the `data:` marker are ignored.
pub fn parse_sse_line(line: &str) -> Option<Result<StreamEvent, ApiError>> {
    let data = line.strip_prefix("data:")?;
    parse_data(data)
}

pub fn parse_event(v: &Value) -> Option<Result<StreamEvent, ApiError>> {
    match v["type"].as_str()? {
        "content_block_delta" => {
            let delta = &v["delta"];
            if delta["type"].as_str() != Some("text_delta") {
                return None;
            }
            match delta["text"].as_str() {
                Some(text) => Some(Ok(StreamEvent::ContentDelta(text.to_string()))),
                None => {
                    debug!("skipping text delta without text");
                    None
                }
            }
        }
        "message_delta" => {
            let stop_reason = v["delta"]["stop_reason"].as_str().map(StopReason::from);
            Some(Ok(StreamEvent::MessageDelta { stop_reason }))
        }
        "error" => Some(Err(ApiError::from_stream_error(&v["error"]))),
        _ => None,
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
