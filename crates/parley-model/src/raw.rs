// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Raw transport: one chunked POST whose body is parsed as SSE by hand.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, trace};

use crate::{
    parse_sse_line, transport::EventStream, ApiError, Endpoint, StreamEvent, StreamRequest,
    Transport,
};

pub struct RawSseTransport {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl RawSseTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Transport for RawSseTransport {
    fn name(&self) -> &str {
        "raw-sse"
    }

    async fn open(&self, req: StreamRequest) -> Result<EventStream, ApiError> {
        let body = req.to_body();

        let mut http_req = self
            .client
            .post(self.endpoint.messages_url())
            .header("x-api-key", &self.endpoint.api_key)
            .header("anthropic-version", &self.endpoint.api_version)
            .header("accept", "text/event-stream")
            .json(&body);
        for (name, value) in &req.headers {
            http_req = http_req.header(name.as_str(), value.as_str());
        }

        debug!(
            model = %req.model,
            max_tokens = req.max_tokens,
            message_count = req.messages.len(),
            extra_headers = req.headers.len(),
            "opening raw SSE stream"
        );
        trace!(request_body = ?body, "full completion request");

        let resp = http_req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &text));
        }

        // SSE events can be split across TCP packets (and multi-byte
        // characters across chunk boundaries).  Keep a byte buffer across
        // chunks and only decode complete lines; the trailing `None` flushes
        // a final line that arrived without a newline.
        let event_stream = resp
            .bytes_stream()
            .map(Some)
            .chain(futures::stream::once(async { None }))
            .scan(Vec::new(), |buf, chunk| {
                let events = match chunk {
                    Some(Ok(bytes)) => {
                        buf.extend_from_slice(&bytes);
                        drain_complete_lines(buf)
                    }
                    Some(Err(e)) => vec![Err(ApiError::from(e))],
                    None => flush_remaining(buf),
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Parse every complete `\n`-terminated line in `buf`, leaving any trailing
/// partial line in place for the next chunk.
pub(crate) fn drain_complete_lines(buf: &mut Vec<u8>) -> Vec<Result<StreamEvent, ApiError>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=nl_pos).collect();
        let line = String::from_utf8_lossy(&line[..nl_pos]);
        if let Some(ev) = parse_sse_line(line.trim_end_matches('\r')) {
            events.push(ev);
        }
    }
    events
}

fn flush_remaining(buf: &mut Vec<u8>) -> Vec<Result<StreamEvent, ApiError>> {
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    parse_sse_line(line.trim_end_matches('\r')).into_iter().collect()
}
