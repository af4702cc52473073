// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! API key lookup and storage.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use parley_config::ModelConfig;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key must not be empty")]
    Empty,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("an api_key in the configuration file takes precedence; remove it to use a stored key")]
    ShadowedByConfig,
    #[error("credential store unavailable")]
    Unavailable,
}

/// Source of the API key used for every request.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The current key, or `None` when none is configured.
    async fn get(&self) -> Option<String>;

    /// Replace the stored key.  After success, `get` returns it.
    async fn set(&self, secret: &str) -> Result<(), CredentialError>;
}

/// Key from the config file, then the key file in the data directory, then
/// an environment variable.  `set` writes the key file and refuses while a
/// config key would hide it.
pub struct KeyFileCredentials {
    config_key: Option<String>,
    env_var: Option<String>,
    path: PathBuf,
}

impl KeyFileCredentials {
    pub fn new(config_key: Option<String>, env_var: Option<String>, path: impl Into<PathBuf>) -> Self {
        Self { config_key, env_var, path: path.into() }
    }

    pub fn from_config(model: &ModelConfig, path: impl Into<PathBuf>) -> Self {
        Self::new(model.api_key.clone(), model.api_key_env.clone(), path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn config_key(&self) -> Option<String> {
        self.config_key.clone().and_then(non_empty)
    }

    fn io_err(&self, source: io::Error) -> CredentialError {
        CredentialError::Io { path: self.path.clone(), source }
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[async_trait]
impl CredentialStore for KeyFileCredentials {
    async fn get(&self) -> Option<String> {
        if let Some(key) = self.config_key() {
            return Some(key);
        }
        if let Some(key) = tokio::fs::read_to_string(&self.path).await.ok().and_then(non_empty) {
            return Some(key);
        }
        let var = self.env_var.as_ref()?;
        let key = std::env::var(var).ok().and_then(non_empty)?;
        debug!(var = %var, "api key from environment");
        Some(key)
    }

    async fn set(&self, secret: &str) -> Result<(), CredentialError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CredentialError::Empty);
        }
        if self.config_key().is_some() {
            return Err(CredentialError::ShadowedByConfig);
        }
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| self.io_err(e))?;
            }
        }
        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);
        let mut file = opts.open(&self.path).await.map_err(|e| self.io_err(e))?;
        file.write_all(format!("{secret}\n").as_bytes()).await.map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), "api key stored");
        Ok(())
    }
}

/// In-memory key holder for tests and embedding.
#[derive(Default)]
pub struct StaticCredentials {
    key: Mutex<Option<String>>,
}

impl StaticCredentials {
    pub fn new(key: Option<&str>) -> Self {
        Self { key: Mutex::new(key.map(str::to_string)) }
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn get(&self) -> Option<String> {
        self.key.lock().ok().and_then(|k| k.clone()).and_then(non_empty)
    }

    async fn set(&self, secret: &str) -> Result<(), CredentialError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CredentialError::Empty);
        }
        let mut guard = self.key.lock().map_err(|_| CredentialError::Unavailable)?;
        *guard = Some(secret.to_string());
        Ok(())
    }
}
