// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;
use thiserror::Error;

/// Failures reported by the completion endpoint or the transport beneath it.
///
/// The `Display` text is the message shown to the user.  None of these are
/// retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP 401: the endpoint rejected the API key.
    #[error("Invalid API key. Please check your settings.")]
    Auth,
    /// HTTP 400, with the server's explanation when it sent one.
    #[error("Bad request: {}", detail.as_deref().unwrap_or("Unknown error"))]
    BadRequest { detail: Option<String> },
    /// HTTP 429.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,
    /// HTTP 5xx (including Anthropic's 529 "overloaded").
    #[error("The model service is currently unavailable (HTTP {status}). Please try again later.")]
    ServiceUnavailable { status: u16 },
    /// Any other non-success status.
    #[error("Request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection, TLS or body-read failure.
    #[error("Connection to the model service failed: {0}")]
    Transport(String),
}

impl ApiError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ApiError::Auth,
            400 => ApiError::BadRequest { detail: error_message(body) },
            429 => ApiError::RateLimited,
            s if s >= 500 => ApiError::ServiceUnavailable { status: s },
            s => ApiError::Status { status: s, body: body.to_string() },
        }
    }

    /// Classify the `error` object of an in-stream `error` event.
    pub fn from_stream_error(err: &Value) -> Self {
        let message = err["message"].as_str().map(str::to_string);
        match err["type"].as_str().unwrap_or("") {
            "authentication_error" => ApiError::Auth,
            "invalid_request_error" => ApiError::BadRequest { detail: message },
            "rate_limit_error" => ApiError::RateLimited,
            "overloaded_error" => ApiError::ServiceUnavailable { status: 529 },
            "api_error" => ApiError::ServiceUnavailable { status: 500 },
            _ => ApiError::Status {
                status: 200,
                body: message.unwrap_or_else(|| err.to_string()),
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

/// Extract `error.message` from an Anthropic-style JSON error body.
fn error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v["error"]["message"].as_str().map(str::to_string)
}
