// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::tool::{Tool, ToolOutput};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 30_000;

const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// Built-in tool that runs a shell command.
pub struct BashTool {
    pub timeout_secs: u64,
    pub output_limit: usize,
}

impl Default for BashTool {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            output_limit: OUTPUT_LIMIT_BYTES,
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return stdout+stderr. \
         Commands run in the gateway's working directory and inherit its \
         environment. Long-running commands are killed after the timeout. \
         Prefer non-interactive commands; avoid anything that needs a TTY."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolOutput {
        let command = args.get("command").and_then(|v| v.as_str()).unwrap_or("");
        if command.is_empty() {
            return ToolOutput::err("No command provided.");
        }

        debug!(cmd = %command, "bash tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // When the timeout fires and the future is dropped, tokio sends
        // SIGKILL before releasing the child handle.
        cmd.kill_on_drop(true);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await;

        match result {
            Ok(Ok(out)) => {
                let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
                output.push_str(&String::from_utf8_lossy(&out.stderr));
                if output.len() > self.output_limit {
                    output = format!(
                        "{}{TRUNCATION_MARKER}",
                        truncate_at_char_boundary(&output, self.output_limit)
                    );
                }
                let code = out.status.code().unwrap_or(-1);
                if code != 0 {
                    ToolOutput::err(format!("Exit code: {code}\n{output}"))
                } else {
                    ToolOutput::ok(output)
                }
            }
            Ok(Err(e)) => ToolOutput::err(format!("Failed to execute command: {e}")),
            Err(_) => ToolOutput::err(format!(
                "Command timed out after {}s.",
                self.timeout_secs
            )),
        }
    }
}

fn truncate_at_char_boundary(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
