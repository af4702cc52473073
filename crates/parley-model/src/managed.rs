// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Managed transport: the same POST consumed through `reqwest-eventsource`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{retry::Never, Error as SourceError, Event, EventSource};
use tracing::debug;

use crate::{parse_data, transport::EventStream, ApiError, Endpoint, StreamRequest, Transport};

pub struct ManagedTransport {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl ManagedTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Transport for ManagedTransport {
    fn name(&self) -> &str {
        "managed"
    }

    async fn open(&self, req: StreamRequest) -> Result<EventStream, ApiError> {
        let builder = self
            .client
            .post(self.endpoint.messages_url())
            .header("x-api-key", &self.endpoint.api_key)
            .header("anthropic-version", &self.endpoint.api_version)
            .json(&req.to_body());

        debug!(
            model = %req.model,
            max_tokens = req.max_tokens,
            message_count = req.messages.len(),
            "opening managed event stream"
        );

        let mut source =
            EventSource::new(builder).map_err(|e| ApiError::Transport(e.to_string()))?;
        // The event source reconnects on its own by default; every failure
        // here is terminal for the attempt.
        source.set_retry_policy(Box::new(Never));

        // Wait for the connection so a non-success status is reported from
        // `open` rather than as the first stream item.
        match source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(_))) => {
                source.close();
                return Err(ApiError::Transport("event received before the stream opened".into()));
            }
            Some(Err(e)) => {
                source.close();
                return Err(classify(e).await);
            }
            None => {
                return Err(ApiError::Transport("event stream closed before opening".into()));
            }
        }

        let events = futures::stream::unfold(Some(source), |state| async move {
            let mut source = state?;
            loop {
                match source.next().await {
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(msg))) => match parse_data(&msg.data) {
                        Some(Ok(ev)) => return Some((Ok(ev), Some(source))),
                        Some(Err(e)) => {
                            source.close();
                            return Some((Err(e), None));
                        }
                        None => continue,
                    },
                    Some(Err(SourceError::StreamEnded)) | None => {
                        source.close();
                        return None;
                    }
                    Some(Err(e)) => {
                        source.close();
                        return Some((Err(classify(e).await), None));
                    }
                }
            }
        });

        Ok(Box::pin(events))
    }
}

/// Map an event-source failure onto the shared error taxonomy, reading the
/// response body when the server sent one.
async fn classify(err: SourceError) -> ApiError {
    match err {
        SourceError::InvalidStatusCode(status, resp) => {
            let body = resp.text().await.unwrap_or_default();
            ApiError::from_status(status.as_u16(), &body)
        }
        SourceError::InvalidContentType(_, resp) => {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            ApiError::Status { status, body }
        }
        SourceError::Transport(e) => ApiError::from(e),
        other => ApiError::Transport(other.to_string()),
    }
}
