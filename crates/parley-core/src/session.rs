// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use parley_model::{Role, StopReason, WireMessage};
use serde::{Deserialize, Serialize};

/// Title every session carries until its first message arrives.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Number of characters of the first message kept in a derived title.
pub const TITLE_LIMIT: usize = 30;

/// Marker appended to a derived title that was cut short.
pub const TITLE_ELLIPSIS: &str = "...";

/// Session identifier: the creation time in milliseconds since the epoch.
/// Doubles as the sort key (newest = largest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Creation time encoded in the identifier.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.0).ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(SessionId)
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Why the reply ended; assistant messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// The reply hit the output token ceiling.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into(), stop_reason: None, truncated: false }
    }

    /// A finalized assistant reply.  `truncated` follows from the stop reason.
    pub fn assistant(text: impl Into<String>, stop_reason: Option<StopReason>) -> Self {
        let truncated = stop_reason.as_ref().is_some_and(StopReason::is_truncated);
        Self { role: Role::Assistant, content: text.into(), stop_reason, truncated }
    }

    /// Role/content pair for the wire; bookkeeping fields are dropped.
    pub fn to_wire(&self) -> WireMessage {
        WireMessage { role: self.role, content: self.content.clone() }
    }
}

/// One independent conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Default for Session {
    fn default() -> Self {
        Self { title: DEFAULT_TITLE.to_string(), messages: Vec::new() }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never used: no messages and still the default title.
    pub fn is_untouched(&self) -> bool {
        self.messages.is_empty() && self.title == DEFAULT_TITLE
    }

    /// Case-insensitive substring match against the title, then each
    /// message.  `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() || self.title.to_lowercase().contains(needle) {
            return true;
        }
        self.messages
            .iter()
            .any(|m| m.content.to_lowercase().contains(needle))
    }
}

/// All sessions keyed by identifier.
pub type SessionMap = BTreeMap<SessionId, Session>;

/// Title derived from the first message: the first [`TITLE_LIMIT`]
/// characters, plus [`TITLE_ELLIPSIS`] when the text was longer.
pub fn derive_title(text: &str) -> String {
    let mut chars = text.chars();
    let mut title: String = chars.by_ref().take(TITLE_LIMIT).collect();
    if chars.next().is_some() {
        title.push_str(TITLE_ELLIPSIS);
    }
    title
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
