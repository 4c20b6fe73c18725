// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

use tether_model::{Message, ToolSchema};

/// Per-role token estimates plus the model's context window.
///
/// Deliberately rough: total characters of the JSON-serialized subset
/// divided by 4.  The numbers exist to show clients roughly where the
/// context budget goes and to trigger compaction — never to enforce a
/// hard limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextInfo {
    pub system: usize,
    pub tools: usize,
    pub user: usize,
    pub assistant: usize,
    pub tool_results: usize,
    pub context_window: usize,
}

/// chars/4 over a JSON serialization.
fn json_tokens<T: Serialize>(value: &T) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0) / 4
}

/// Estimated prompt size for a completion request: system prompt + tool
/// schemas + full message list.
pub fn estimate_prompt_tokens(
    system_prompt: &str,
    tools: &[ToolSchema],
    messages: &[Message],
) -> usize {
    let tools_chars = if tools.is_empty() {
        0
    } else {
        serde_json::to_string(tools).map(|s| s.len()).unwrap_or(0)
    };
    let messages_chars = serde_json::to_string(messages)
        .map(|s| s.len())
        .unwrap_or(0);
    (system_prompt.len() + tools_chars + messages_chars) / 4
}

/// Build the per-role breakdown for a `context_request` reply.
pub fn build_context_info(
    system_prompt: &str,
    tools: &[ToolSchema],
    messages: &[Message],
    context_window: usize,
) -> ContextInfo {
    let by_role = |pred: fn(&Message) -> bool| {
        let subset: Vec<&Message> = messages.iter().filter(|m| pred(m)).collect();
        json_tokens(&subset)
    };
    ContextInfo {
        system: system_prompt.len() / 4,
        tools: if tools.is_empty() { 0 } else { json_tokens(&tools) },
        user: by_role(|m| matches!(m, Message::User { .. })),
        assistant: by_role(|m| matches!(m, Message::Assistant { .. })),
        tool_results: by_role(|m| matches!(m, Message::ToolResult { .. })),
        context_window,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
