// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_config::ModelConfig;
use parley_model::{
    catalog, select_transport, ApiError, Endpoint, StopReason, StreamEvent, StreamRequest, Transport,
};

use crate::{
    ChatEvent, CredentialError, CredentialStore, Message, SessionId, SessionStore, SessionSummary,
    StoreError,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("API key not configured. Run `parley set-key` or set the configured environment variable.")]
    NotConfigured,
    #[error("message is empty")]
    EmptyMessage,
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownSession(id) => EngineError::UnknownSession(id),
        }
    }
}

/// The conversation engine.  Owns the session store and drives one
/// streaming completion at a time; `submit` borrows the engine mutably, so
/// a second submission cannot start while one is in flight.
pub struct ChatEngine {
    store: SessionStore,
    credentials: Arc<dyn CredentialStore>,
    config: ModelConfig,
    /// Replaces capability-driven transport selection (tests, proxies)
    transport: Option<Arc<dyn Transport>>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatEngine {
    /// Build an engine and the receiving end of its event channel.
    pub fn new(
        config: ModelConfig,
        mut store: SessionStore,
        credentials: Arc<dyn CredentialStore>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        store.set_event_sender(tx.clone());
        let engine = Self { store, credentials, config, transport: None, events: tx };
        (engine, rx)
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Load stored sessions and activate the newest.
    pub async fn open(&mut self) {
        self.store.open().await;
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn model(&self) -> &str {
        &self.config.name
    }

    /// Use `model` for subsequent submissions.  History is kept.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.name = model.into();
        info!(model = %self.config.name, "model changed");
    }

    pub async fn set_api_key(&self, key: &str) -> Result<(), CredentialError> {
        self.credentials.set(key).await
    }

    pub async fn is_configured(&self) -> bool {
        self.credentials.get().await.is_some()
    }

    // ── Session passthroughs ──────────────────────────────────────────────────

    pub async fn new_session(&mut self) -> SessionId {
        self.store.create_session().await
    }

    pub async fn switch_to(&mut self, id: SessionId) {
        self.store.switch_active(id).await;
    }

    pub async fn delete(&mut self, id: SessionId) {
        self.store.delete_session(id).await;
    }

    pub fn list(&self, filter: Option<&str>) -> Vec<SessionSummary> {
        self.store.list(filter)
    }

    // ── Ingestion ─────────────────────────────────────────────────────────────

    /// Send `text` as a user message in the active session and stream the
    /// reply.  Emits `Progress` with the full text so far for every delta,
    /// then `Completed` with the stored reply.
    ///
    /// On failure an `Error` event is emitted and the user message stays in
    /// the session; no partial reply is stored.
    pub async fn submit(&mut self, text: &str) -> Result<Message, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let api_key = self.credentials.get().await.ok_or(EngineError::NotConfigured)?;

        let id = match self.store.active_id() {
            Some(id) => id,
            None => self.store.create_session().await,
        };
        self.store.append_message(id, Message::user(text)).await?;

        let capability = catalog::capability(&self.config.name);
        let endpoint = Endpoint::new(&self.config.base_url, api_key, &self.config.api_version);
        let transport = match &self.transport {
            Some(t) => t.clone(),
            None => select_transport(&capability, &endpoint),
        };
        let req = StreamRequest {
            model: self.config.name.clone(),
            max_tokens: self.config.max_tokens.unwrap_or(capability.max_output_tokens),
            system: self.config.system_prompt.clone(),
            messages: self.store.messages(id).iter().map(Message::to_wire).collect(),
            headers: capability.headers.clone(),
        };
        debug!(
            transport = transport.name(),
            model = %req.model,
            max_tokens = req.max_tokens,
            messages = req.messages.len(),
            "submitting"
        );

        let (reply, stop_reason) = match self.ingest(transport.as_ref(), req).await {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "completion failed");
                self.emit(ChatEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };

        let message = Message::assistant(reply, stop_reason);
        if message.truncated {
            info!("reply hit the output token limit");
        }
        self.store.append_message(id, message.clone()).await?;
        self.emit(ChatEvent::Completed { id, message: message.clone() });
        Ok(message)
    }

    /// Drain one completion stream into the accumulated text and the last
    /// stop reason seen.
    async fn ingest(
        &self,
        transport: &dyn Transport,
        req: StreamRequest,
    ) -> Result<(String, Option<StopReason>), ApiError> {
        let mut stream = transport.open(req).await?;
        let mut buffer = String::new();
        let mut stop_reason = None;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::ContentDelta(delta) => {
                    // Every delta is a progress step, even an empty one.
                    buffer.push_str(&delta);
                    self.emit(ChatEvent::Progress(buffer.clone()));
                }
                StreamEvent::MessageDelta { stop_reason: Some(reason) } => {
                    stop_reason = Some(reason);
                }
                StreamEvent::MessageDelta { stop_reason: None } => {}
            }
        }
        Ok((buffer, stop_reason))
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }
}
