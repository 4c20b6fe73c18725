// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolOutput};

pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file, overwriting any existing content. \
         Creates parent directories if needed. \
         Prefer the edit tool for changing existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to write."
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file."
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolOutput {
        let path = args.get("file_path").and_then(|v| v.as_str()).unwrap_or("");
        if path.is_empty() {
            return ToolOutput::err("No file_path provided.");
        }
        let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
            return ToolOutput::err("No content provided.");
        };

        debug!(path = %path, bytes = content.len(), "write tool");

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolOutput::err(format!("Error creating directories: {e}"));
                }
            }
        }

        match tokio::fs::write(path, content).await {
            Ok(()) => ToolOutput::ok(format!("Wrote {} bytes to {path}", content.len())),
            Err(e) => ToolOutput::err(format!("Error writing file: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
