// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{transport::EventStream, ApiError, StopReason, StreamEvent, StreamRequest, Transport};

/// One scripted reply: either the endpoint refuses the request outright or
/// it streams the given items in order.
#[derive(Debug, Clone)]
pub enum Script {
    Refuse(ApiError),
    Stream(Vec<Result<StreamEvent, ApiError>>),
}

/// A pre-scripted transport for tests.  Each call to `open` pops the next
/// script from the front of the queue, so tests control exact event
/// sequences without network access.
pub struct ScriptedTransport {
    scripts: Arc<Mutex<Vec<Script>>>,
    /// The last `StreamRequest` seen by this transport.
    pub last_request: Arc<Mutex<Option<StreamRequest>>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Every call streams `deltas` and finishes with `stop_reason`.
    pub fn always_text(deltas: &[&str], stop_reason: StopReason) -> Self {
        let script = Self::text_script(deltas, stop_reason);
        Self::new(vec![script; 16])
    }

    /// Script that streams `deltas` followed by a stop reason.
    pub fn text_script(deltas: &[&str], stop_reason: StopReason) -> Script {
        let mut items: Vec<Result<StreamEvent, ApiError>> = deltas
            .iter()
            .map(|d| Ok(StreamEvent::ContentDelta((*d).to_string())))
            .collect();
        items.push(Ok(StreamEvent::MessageDelta { stop_reason: Some(stop_reason) }));
        Script::Stream(items)
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        self.last_request.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, req: StreamRequest) -> Result<EventStream, ApiError> {
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(req);
        }
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| if s.is_empty() { None } else { Some(s.remove(0)) })
            .ok_or_else(|| ApiError::Transport("scripted transport exhausted".into()))?;
        match script {
            Script::Refuse(e) => Err(e),
            Script::Stream(items) => Ok(Box::pin(stream::iter(items))),
        }
    }
}
