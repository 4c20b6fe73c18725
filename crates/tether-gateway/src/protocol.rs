// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire protocol between clients and the gateway.
//!
//! Text frames, one JSON object per frame.  Client → gateway messages
//! carry a `type` plus an optional `message`; gateway → client frames are
//! the serialized agent events plus the auxiliary messages defined here.
//! Forward-compatible clients ignore unknown gateway frame types.

use serde::Serialize;
use thiserror::Error;

use tether_core::{AgentEvent, ContextInfo};
use tether_model::ModelCatalogEntry;

/// A malformed client frame.  Replied to the sender as an `error` frame;
/// never changes gateway state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("message must be a JSON object")]
    NotAnObject,
    #[error("unknown message type: {0:?}")]
    UnknownType(String),
    #[error("'{0}' requires a non-empty 'message' field")]
    MissingMessage(&'static str),
}

/// A parsed client → gateway message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Prompt { message: String },
    Steer { message: String },
    Abort,
    ContextRequest,
    ModelListRequest,
}

impl ClientMessage {
    /// Parse one text frame.  Tolerant of surrounding whitespace and
    /// unknown extra fields; strict about the `type` value and the
    /// `message` requirement for prompt/steer.
    pub fn parse(data: &str) -> Result<Self, ProtocolError> {
        let parsed: serde_json::Value = serde_json::from_str(data.trim())
            .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let obj = parsed.as_object().ok_or(ProtocolError::NotAnObject)?;

        let msg_type = obj
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let message = obj
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match msg_type.as_str() {
            "prompt" => {
                if message.is_empty() {
                    Err(ProtocolError::MissingMessage("prompt"))
                } else {
                    Ok(Self::Prompt { message })
                }
            }
            "steer" => {
                if message.is_empty() {
                    Err(ProtocolError::MissingMessage("steer"))
                } else {
                    Ok(Self::Steer { message })
                }
            }
            "abort" => Ok(Self::Abort),
            "context_request" => Ok(Self::ContextRequest),
            "model_list_request" => Ok(Self::ModelListRequest),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Auxiliary gateway → client frames (everything that is not a
/// serialized [`AgentEvent`]).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Echo of a prompt so late-arriving clients see what was sent.
    UserMessage { message: String },
    /// Reply to `context_request` (requester only).
    ContextInfo(ContextInfo),
    /// Reply to `model_list_request` (requester only).
    ModelList {
        models: Vec<ModelCatalogEntry>,
        current: String,
    },
    /// A `/model <id>` steer took effect.
    ModelSet { model: String },
    ReloadStart,
    ReloadEnd { success: bool, message: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failure"}"#.into())
    }
}

/// Serialize an agent event for the wire.
pub fn serialize_event(event: &AgentEvent) -> String {
    serde_json::to_string(event)
        .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failure"}"#.into())
}

// ── Unit tests ────────────────────────────────────────────────────────────────
