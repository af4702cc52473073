// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::{Message, SessionId};

/// Events emitted by the store and the engine.
/// Front ends subscribe to these to drive their output.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The full assistant text accumulated so far.  Each event carries a
    /// longer prefix of the final reply; re-render from it, never append.
    Progress(String),
    /// A session received its derived title
    TitleChanged { id: SessionId, title: String },
    /// The assistant reply was finalized and stored
    Completed { id: SessionId, message: Message },
    /// The in-flight request failed; the text is user-facing
    Error(String),
    /// Non-blocking notice (e.g. sessions could not be saved)
    Notice(String),
}
