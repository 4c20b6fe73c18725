// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Default system prompt and its override resolution.

/// Environment variable naming a file whose contents replace the default
/// system prompt.
pub const SYSTEM_PROMPT_FILE_ENV: &str = "TETHER_SYSTEM_PROMPT_FILE";

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a coding agent working in the user's repository through a set of \
tools: bash, read, write, edit, and search_web.

Guidelines:
- Use the read tool before editing a file; the edit tool takes the \
<line>:<hash> references that read returns, and they go stale whenever \
the file changes.
- Prefer edit over write for existing files.
- Use bash for builds, tests, and anything else the other tools do not \
cover. Keep commands non-interactive.
- When a tool fails, read the error, adjust, and retry rather than \
repeating the same call.
- Several people may be watching this session at once; keep responses \
concise and grounded in what the tools actually returned.";

/// Resolve the effective system prompt.
///
/// Priority: `TETHER_SYSTEM_PROMPT_FILE` (when set and readable), then
/// the configured override, then the built-in default.
pub fn system_prompt(config_override: Option<&str>) -> String {
    if let Ok(path) = std::env::var(SYSTEM_PROMPT_FILE_ENV) {
        match std::fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => tracing::warn!(%path, "system prompt file is empty; ignoring"),
            Err(e) => tracing::warn!(%path, "cannot read system prompt file: {e}"),
        }
    }
    config_override
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}
