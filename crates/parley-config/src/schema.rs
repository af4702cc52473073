// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fixed system preamble sent with every completion request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Claude, an AI assistant made by Anthropic. You're running in parley, a terminal chat client.";

/// File name of the session collection inside the data directory.
pub const SESSIONS_FILE: &str = "sessions.json";

/// File name of the stored API key inside the data directory.
pub const CREDENTIALS_FILE: &str = "credentials";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier forwarded to the completion endpoint.  Its entry in
    /// the capability table decides the output budget and transport.
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Base URL of the completion endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Explicit API key; prefer `api_key_env` or `parley set-key` so secrets
    /// stay out of version-controlled files
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    /// Value of the `anthropic-version` request header
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// System preamble sent with every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Overrides the capability table's maximum output token budget
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_model_name() -> String {
    "claude-3-7-sonnet-latest".into()
}
fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_api_key_env() -> Option<String> {
    Some("ANTHROPIC_API_KEY".into())
}
fn default_api_version() -> String {
    "2023-06-01".into()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            api_version: default_api_version(),
            system_prompt: default_system_prompt(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `sessions.json` and the stored API key.
    /// `~` and environment variables are expanded.  Defaults to
    /// `$XDG_DATA_HOME/parley`.
    #[serde(default)]
    pub data_dir: Option<String>,
}

impl StorageConfig {
    /// Resolved data directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            let expanded = shellexpand::full(dir)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| dir.clone());
            return PathBuf::from(expanded);
        }
        dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("parley")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.resolved_data_dir().join(SESSIONS_FILE)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.resolved_data_dir().join(CREDENTIALS_FILE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Match whole words only when searching the rendered conversation
    #[serde(default)]
    pub whole_word: bool,
}
