// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::anchor::HashRef;
use crate::tool::{Tool, ToolOutput};

/// Hash-anchored file editor.
///
/// The model refers to lines with the `<line>:<hash>` references emitted
/// by the read tool.  The file is re-read and every anchor re-verified at
/// edit time, so an edit can only land on lines that still exist
/// unchanged; anything else fails with a drift error instructing the
/// model to re-read.
pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace lines in a file using a hash reference from the read tool. \
         'hash' is either \"<line>:<hash>\" for a single line or \
         \"<line1>:<hash1>-<line2>:<hash2>\" for an inclusive range. \
         The reference only matches while the lines are unchanged; if the \
         file has drifted the edit fails and the file must be re-read. \
         'new_text' replaces the referenced lines (may span multiple lines; \
         empty deletes them)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to edit."
                },
                "hash": {
                    "type": "string",
                    "description": "Line reference from the read tool: \
                                    \"<line>:<hash>\" or \"<line1>:<hash1>-<line2>:<hash2>\"."
                },
                "new_text": {
                    "type": "string",
                    "description": "Replacement text for the referenced lines."
                }
            },
            "required": ["file_path", "hash", "new_text"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolOutput {
        let path = args.get("file_path").and_then(|v| v.as_str()).unwrap_or("");
        if path.is_empty() {
            return ToolOutput::err("No file_path provided.");
        }
        let hash_ref = args.get("hash").and_then(|v| v.as_str()).unwrap_or("");
        if hash_ref.is_empty() {
            return ToolOutput::err("No hash reference provided.");
        }
        let Some(new_text) = args.get("new_text").and_then(|v| v.as_str()) else {
            return ToolOutput::err("No new_text provided.");
        };

        debug!(path = %path, hash = %hash_ref, "edit tool");

        let parsed = match HashRef::parse(hash_ref) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(e),
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::err(format!("File not found: {path}"));
            }
            Err(e) => return ToolOutput::err(format!("Error reading file: {e}")),
        };

        let had_trailing_newline = content.ends_with('\n');
        let lines: Vec<String> = content.lines().map(str::to_string).collect();

        let (start, end) = match parsed.resolve(&lines) {
            Ok(span) => span,
            Err(e) => return ToolOutput::err(e),
        };

        let mut result: Vec<String> = lines[..start].to_vec();
        result.extend(new_text.lines().map(str::to_string));
        result.extend_from_slice(&lines[end + 1..]);

        let mut new_content = result.join("\n");
        if had_trailing_newline && !new_content.is_empty() {
            new_content.push('\n');
        }

        match tokio::fs::write(path, &new_content).await {
            Ok(()) => ToolOutput::ok("Edit applied successfully."),
            Err(e) => ToolOutput::err(format!("Error writing file: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
