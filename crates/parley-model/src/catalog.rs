// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Model capability table: output budget and required transport headers
//! for every known model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Output token budget used for models missing from the catalog.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Capability profile for a single model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCapability {
    /// Model identifier sent to the endpoint (e.g. "claude-3-7-sonnet-latest")
    pub id: String,
    /// Human-readable display name
    pub name: String,
    /// Maximum output tokens per completion
    pub max_output_tokens: u32,
    /// Non-default request headers the model requires
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Short description
    #[serde(default)]
    pub description: String,
}

impl ModelCapability {
    /// Profile for a model the catalog does not know about.
    pub fn fallback(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            headers: BTreeMap::new(),
            description: String::new(),
        }
    }

    /// Models that need extra request headers are streamed over the raw
    /// SSE transport.
    pub fn requires_raw_transport(&self) -> bool {
        !self.headers.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<ModelCapability>,
}

/// Return all entries from the bundled static catalog.
pub fn static_catalog() -> Vec<ModelCapability> {
    let yaml = include_str!("../models.yaml");
    let catalog: CatalogFile =
        serde_yaml::from_str(yaml).expect("bundled models.yaml must be valid");
    catalog.models
}

/// Look up a single model by id (or display name).
pub fn lookup(model_id: &str) -> Option<ModelCapability> {
    static_catalog()
        .into_iter()
        .find(|e| e.id == model_id || e.name == model_id)
}

/// Capability profile for `model_id`, falling back to the default profile
/// for unknown models.
pub fn capability(model_id: &str) -> ModelCapability {
    lookup(model_id).unwrap_or_else(|| ModelCapability::fallback(model_id))
}

// ── Unit tests ────────────────────────────────────────────────────────────────
