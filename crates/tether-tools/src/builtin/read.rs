// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::anchor::format_line;
use crate::tool::{Tool, ToolOutput};

/// Read one or more files, emitting each line as `<lineno>:<hash>|<content>`.
///
/// The hash is the anchor the edit tool consumes, so the model always has
/// a current reference for every line it has seen.
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read files and return their contents with line anchors. \
         Each line is formatted <lineno>:<hash>|<content>; pass the \
         <lineno>:<hash> part to the edit tool to change that line. \
         Multiple files are returned as a JSON map keyed by path."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_paths": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Absolute paths of the files to read."
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based)."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read."
                }
            },
            "required": ["file_paths"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolOutput {
        let paths: Vec<String> = args
            .get("file_paths")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if paths.is_empty() {
            return ToolOutput::err("No file paths provided.");
        }
        let offset = args
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|o| o.max(1) as usize)
            .unwrap_or(1);
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|l| l as usize);

        debug!(count = paths.len(), offset, ?limit, "read tool");

        if paths.len() == 1 {
            return match read_one(&paths[0], offset, limit).await {
                Ok(text) => ToolOutput::ok(text),
                Err(e) => ToolOutput::err(e),
            };
        }

        // Multiple files: a per-file error never fails the whole call.
        let mut map = Map::new();
        for path in &paths {
            let entry = match read_one(path, offset, limit).await {
                Ok(text) => json!({ "content": text }),
                Err(e) => json!({ "error": e }),
            };
            map.insert(path.clone(), entry);
        }
        ToolOutput::ok(serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_default())
    }
}

async fn read_one(path: &str, offset: usize, limit: Option<usize>) -> Result<String, String> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(format!("File not found: {path}"));
        }
        Err(e) => return Err(format!("Error reading file: {e}")),
    };

    let start = offset - 1;
    let lines = text.lines().skip(start);
    let numbered: Vec<String> = match limit {
        Some(n) => lines
            .take(n)
            .enumerate()
            .map(|(i, l)| format_line(start + i + 1, l))
            .collect(),
        None => lines
            .enumerate()
            .map(|(i, l)| format_line(start + i + 1, l))
            .collect(),
    };
    Ok(numbered.join("\n"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
