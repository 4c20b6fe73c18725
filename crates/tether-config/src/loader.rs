// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Default config file location: `~/.config/tether/config.yaml`.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tether/config.yaml"))
}

/// Load the gateway configuration.
///
/// With an explicit `path` the file must exist and parse.  Without one,
/// the default location is tried and a missing file silently falls back
/// to built-in defaults — a fresh install needs no config at all.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let candidate = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading config file {}", p.display()))?;
            return serde_yaml::from_str(&text)
                .with_context(|| format!("parsing config file {}", p.display()));
        }
        None => default_config_path(),
    };

    if let Some(p) = candidate {
        if p.exists() {
            debug!(path = %p.display(), "loading config");
            let text = std::fs::read_to_string(&p)
                .with_context(|| format!("reading config file {}", p.display()))?;
            return serde_yaml::from_str(&text)
                .with_context(|| format!("parsing config file {}", p.display()));
        }
    }

    Ok(Config::default())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
