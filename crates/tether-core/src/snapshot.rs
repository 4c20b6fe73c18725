// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tether_model::Message;

/// On-disk session snapshot: everything needed to resume a conversation
/// after a gateway restart.  Written only on explicit save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Default snapshot location under the per-user state directory.
pub fn default_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether/session.json")
}

/// Load a snapshot; `Ok(None)` when the file does not exist.
pub fn load(path: &Path) -> anyhow::Result<Option<SessionSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading session snapshot {}", path.display()))?;
    let snapshot = serde_json::from_str(&text)
        .with_context(|| format!("parsing session snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Save a snapshot, creating parent directories as needed.
pub fn save(path: &Path, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating snapshot directory {}", parent.display()))?;
        }
    }
    let text = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, text)
        .with_context(|| format!("writing session snapshot {}", path.display()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
