// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use tether_model::ModelCatalogEntry;

/// Events emitted by the agent while processing a prompt.
///
/// Every connected client observes the same ordered stream; the variants
/// serialize with a snake_case `type` discriminator and only the fields
/// relevant to that variant, so they go on the wire as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A model round trip is starting.
    TurnStart,
    /// A text chunk streamed from the model.
    TextDelta { delta: String },
    /// A tool is about to execute.
    ToolStart {
        tool_name: String,
        call_id: String,
        args: serde_json::Value,
    },
    /// A tool finished; `result` is fed back to the model verbatim.
    ToolEnd {
        tool_name: String,
        call_id: String,
        result: String,
        is_error: bool,
    },
    /// The current model round trip finished.
    TurnEnd,
    /// The whole prompt is done; exactly one per prompt() call.
    AgentEnd,
    /// Context compaction is starting.
    CompactionStart,
    /// Compaction finished (or failed — the failure text rides in
    /// `summary` so clients render one shape for both outcomes).
    CompactionEnd {
        summary: String,
        tokens_before: usize,
    },
    /// The turn is unrecoverable; `agent_end` follows.
    Error { message: String },
    /// Catalog metadata for the active model (reply to `/model-info`).
    ModelInfo { model_info: ModelCatalogEntry },
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
