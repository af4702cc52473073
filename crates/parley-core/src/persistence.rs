// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistence of the session collection.
//!
//! The store hands the whole collection to a [`SessionPersistence`] after
//! every mutation; the on-disk implementation keeps it as one pretty-printed
//! JSON document.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::SessionMap;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session data in {path} is corrupt: {source}{}", backup_note(.backup))]
    Corrupt {
        path: PathBuf,
        /// Where the unreadable file was moved, if it could be moved
        backup: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode sessions: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Unavailable(String),
}

fn backup_note(backup: &Option<PathBuf>) -> String {
    match backup {
        Some(p) => format!(" (kept as {})", p.display()),
        None => String::new(),
    }
}

impl PersistenceError {
    /// Whether saving over the stored collection would destroy data that
    /// could not be loaded.
    pub fn blocks_saving(&self) -> bool {
        !matches!(self, PersistenceError::Corrupt { backup: Some(_), .. })
    }
}

/// Storage collaborator for the session collection.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Load the full collection; an absent store is an empty collection.
    async fn load(&self) -> Result<SessionMap, PersistenceError>;

    /// Replace the stored collection with `sessions`.
    async fn save(&self, sessions: &SessionMap) -> Result<(), PersistenceError>;
}

/// Sessions stored as a single JSON file.  Writes go to a sibling temp file
/// that is then renamed over the target, so a crash never leaves a torn file.
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename an unreadable session file to `<name>.corrupt-<millis>` so
    /// the next save cannot overwrite it.
    async fn move_aside(&self) -> Option<PathBuf> {
        let mut name = self.path.file_name()?.to_os_string();
        name.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
        let backup = self.path.with_file_name(name);
        match tokio::fs::rename(&self.path, &backup).await {
            Ok(()) => {
                warn!(path = %self.path.display(), backup = %backup.display(), "moved unreadable session file aside");
                Some(backup)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not move unreadable session file aside");
                None
            }
        }
    }

    fn io_err(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Io { path: self.path.clone(), source }
    }
}

#[async_trait]
impl SessionPersistence for JsonFilePersistence {
    async fn load(&self) -> Result<SessionMap, PersistenceError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session file yet");
                return Ok(SessionMap::new());
            }
            Err(e) => return Err(self.io_err(e)),
        };
        if text.trim().is_empty() {
            return Ok(SessionMap::new());
        }
        match serde_json::from_str(&text) {
            Ok(sessions) => Ok(sessions),
            Err(source) => {
                let backup = self.move_aside().await;
                Err(PersistenceError::Corrupt { path: self.path.clone(), backup, source })
            }
        }
    }

    async fn save(&self, sessions: &SessionMap) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(sessions)?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| self.io_err(e))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), sessions = sessions.len(), "sessions saved");
        Ok(())
    }
}

/// Process-local persistence, for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryPersistence {
    stored: Mutex<SessionMap>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(sessions: SessionMap) -> Self {
        Self { stored: Mutex::new(sessions) }
    }

    /// Copy of what was last saved.
    pub fn snapshot(&self) -> SessionMap {
        self.stored.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionPersistence for MemoryPersistence {
    async fn load(&self) -> Result<SessionMap, PersistenceError> {
        self.stored
            .lock()
            .map(|s| s.clone())
            .map_err(|_| PersistenceError::Unavailable("session memory poisoned".into()))
    }

    async fn save(&self, sessions: &SessionMap) -> Result<(), PersistenceError> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| PersistenceError::Unavailable("session memory poisoned".into()))?;
        *stored = sessions.clone();
        Ok(())
    }
}
