// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::{ApiError, Endpoint, ManagedTransport, ModelCapability, RawSseTransport, StreamEvent, StreamRequest};

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ApiError>> + Send>>;

/// One way of carrying a streaming completion over the wire.
///
/// Every implementation yields the same [`StreamEvent`] sequence for the
/// same server response; accumulation happens in the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Send the request and return the event stream.  A non-success HTTP
    /// status is reported here, before any event is read.
    async fn open(&self, req: StreamRequest) -> Result<EventStream, ApiError>;
}

/// Pick the transport for a model.  Models that need extra request headers
/// use the raw SSE path; all others use the managed event source.
pub fn select_transport(capability: &ModelCapability, endpoint: &Endpoint) -> Arc<dyn Transport> {
    if capability.requires_raw_transport() {
        Arc::new(RawSseTransport::new(endpoint.clone()))
    } else {
        Arc::new(ManagedTransport::new(endpoint.clone()))
    }
}
