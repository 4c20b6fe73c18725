// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// The result of executing a tool.
///
/// Tool failures are data, not exceptions: a failed execution produces
/// `is_error: true` with a human-readable message that is fed back to the
/// model so it can react (retry, re-read the file, pick another tool).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            output: msg.into(),
            is_error: true,
        }
    }
}

/// Trait that every built-in and user-defined tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Must never panic or return early through an
    /// error path: all failures — including missing or empty required
    /// parameters — are reported via [`ToolOutput::err`].
    async fn execute(&self, args: &Value) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_output_is_not_error() {
        let out = ToolOutput::ok("done");
        assert!(!out.is_error);
        assert_eq!(out.output, "done");
    }

    #[test]
    fn err_output_sets_flag() {
        let out = ToolOutput::err("nope");
        assert!(out.is_error);
        assert_eq!(out.output, "nope");
    }
}
