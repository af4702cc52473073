// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Markdown export of a conversation.

use std::fmt::{self, Write as _};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{render::role_label, Message, Session};

/// File name offered when the caller gives none.
pub const DEFAULT_EXPORT_FILE: &str = "chat-export.md";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("No chat to export.")]
    Empty,
}

/// Result of handing a document to a [`SaveTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Saved(PathBuf),
    Cancelled,
    Failed(String),
}

/// Destination for an exported document.
#[async_trait]
pub trait SaveTarget: Send + Sync {
    async fn save(&self, suggested_name: &str, contents: &str) -> ExportOutcome;
}

/// Saves to a fixed path.  A directory path receives the suggested file
/// name.  An existing file is only replaced when `overwrite` is set;
/// otherwise the export is cancelled.
pub struct FileSaveTarget {
    path: PathBuf,
    overwrite: bool,
}

impl FileSaveTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), overwrite: false }
    }

    pub fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }
}

#[async_trait]
impl SaveTarget for FileSaveTarget {
    async fn save(&self, suggested_name: &str, contents: &str) -> ExportOutcome {
        let path = if tokio::fs::metadata(&self.path).await.is_ok_and(|m| m.is_dir()) {
            self.path.join(suggested_name)
        } else {
            self.path.clone()
        };
        if !self.overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "export target exists");
            return ExportOutcome::Cancelled;
        }
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(dir).await {
                    return ExportOutcome::Failed(e.to_string());
                }
            }
        }
        match tokio::fs::write(&path, contents).await {
            Ok(()) => ExportOutcome::Saved(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "export failed");
                ExportOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Markdown document for a conversation: the title as a heading, the export
/// time, then one section per message in order.
pub fn to_markdown<Tz>(title: &str, messages: &[Message], exported_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut out = format!("# {title}\n\n");
    let _ = write!(out, "Exported on {}\n\n", exported_at.format("%Y-%m-%d %H:%M:%S"));
    for message in messages {
        let _ = write!(out, "## {}\n\n{}\n\n", role_label(message.role), message.content);
    }
    out
}

/// Render `session` and hand it to `target`.  Sessions without messages
/// are refused.
pub async fn export_session<Tz>(
    session: &Session,
    target: &dyn SaveTarget,
    exported_at: &DateTime<Tz>,
) -> Result<ExportOutcome, ExportError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if session.messages.is_empty() {
        return Err(ExportError::Empty);
    }
    let document = to_markdown(&session.title, &session.messages, exported_at);
    Ok(target.save(DEFAULT_EXPORT_FILE, &document).await)
}
