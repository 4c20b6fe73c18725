// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model catalog: static metadata for known models.
//!
//! Backs `context_info`, the `/model-info` steer command, and the
//! `model_list_request` reply when the live `/models` endpoint is
//! unreachable.

use serde::{Deserialize, Serialize};

/// Context window assumed for models missing from the catalog.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 128_000;

/// Metadata for a single model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    /// Model identifier as sent to the completion endpoint.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Total context window in tokens (input + output).
    pub context_window: u32,
    /// Maximum output tokens per completion.
    pub max_output_tokens: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<ModelCatalogEntry>,
}

/// Return all entries from the bundled static catalog.
pub fn static_catalog() -> Vec<ModelCatalogEntry> {
    let yaml = include_str!("../models.yaml");
    let catalog: CatalogFile =
        serde_yaml::from_str(yaml).expect("bundled models.yaml must be valid");
    catalog.models
}

/// Look up a single model by id (or display name).
pub fn lookup(model_id: &str) -> Option<ModelCatalogEntry> {
    static_catalog()
        .into_iter()
        .find(|e| e.id == model_id || e.name == model_id)
}

/// Context window for a model, falling back to [`DEFAULT_CONTEXT_WINDOW`]
/// for unknown ids.
pub fn context_window(model_id: &str) -> u32 {
    lookup(model_id)
        .map(|e| e.context_window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

// ── Unit tests ────────────────────────────────────────────────────────────────
