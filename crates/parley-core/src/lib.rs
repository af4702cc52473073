// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod credentials;
mod engine;
mod events;
pub mod export;
mod persistence;
pub mod render;
pub mod search;
mod session;
mod store;

pub use credentials::{CredentialError, CredentialStore, KeyFileCredentials, StaticCredentials};
pub use engine::{ChatEngine, EngineError};
pub use events::ChatEvent;
pub use export::{export_session, to_markdown, ExportError, ExportOutcome, FileSaveTarget, SaveTarget};
pub use persistence::{JsonFilePersistence, MemoryPersistence, PersistenceError, SessionPersistence};
pub use render::{flatten_session, MarkdownRenderer, NodeId, Renderer, TerminalRenderer, TextNode};
pub use search::{search, MatchSpan, SearchIndex};
pub use session::{
    derive_title, Message, Session, SessionId, SessionMap, DEFAULT_TITLE, TITLE_ELLIPSIS, TITLE_LIMIT,
};
pub use store::{SessionStore, SessionSummary, StoreError};
