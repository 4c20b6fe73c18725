use serde::{Deserialize, Serialize};

// ─── Conversation messages ────────────────────────────────────────────────────

/// A single message in the conversation history.
///
/// The ordered message list is the authoritative history sent to the
/// completion endpoint on every turn.  Invariants maintained by the agent
/// loop:
/// - every `ToolResult` is preceded by an `Assistant` message containing a
///   tool call with the matching `tool_call_id`
/// - `tool_call_id`s are unique within a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    #[serde(rename = "tool")]
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content: text,
            tool_calls,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error,
        }
    }

    /// Plain text of this message, when it has any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::User { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::ToolResult { .. } => None,
        }
    }

    /// Tool calls requested by this message (empty for non-assistant roles).
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Approximate token count using the 4-chars-per-token heuristic.
    /// Used only to decide when to compact, never as a hard budget.
    pub fn approx_tokens(&self) -> usize {
        let chars = match self {
            Self::User { content } => content.len(),
            Self::Assistant {
                content,
                tool_calls,
            } => {
                content.as_deref().map(str::len).unwrap_or(0)
                    + tool_calls
                        .iter()
                        .map(|tc| tc.name.len() + tc.arguments.len())
                        .sum::<usize>()
            }
            Self::ToolResult { content, .. } => content.len(),
        };
        (chars / 4).max(1)
    }
}

/// A tool invocation requested by the model, as stored in the conversation.
///
/// `arguments` is the raw JSON string accumulated from the stream; it is
/// parsed lazily at execution time so that malformed arguments degrade to
/// an empty object instead of corrupting the history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

// ─── Completion request ───────────────────────────────────────────────────────

/// A tool schema offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

/// Request sent to the completion endpoint.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    /// Prepended to `messages` as the system message on the wire.
    pub system_prompt: String,
    pub messages: Vec<Message>,
    /// Omitted from the wire when empty.
    pub tools: Vec<ToolSchema>,
    pub stream: bool,
}

// ─── Streamed response events ─────────────────────────────────────────────────

/// A single parsed chunk from the completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// A text fragment (may be empty).
    TextDelta(String),
    /// A partial tool call.  Deltas are positional: the agent accumulates
    /// them keyed by `index`, where the last non-null `id`/`name` win and
    /// `arguments` fragments concatenate in arrival order.
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// The chunk carried a non-null `finish_reason`.
    Finish(String),
    /// The stream terminated normally (`[DONE]` sentinel).
    Done,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_round_trips() {
        let m = Message::user("hello");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"role\":\"user\""), "{json}");
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn assistant_without_tool_calls_omits_field() {
        let m = Message::assistant("reply");
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("tool_calls"), "{json}");
    }

    #[test]
    fn assistant_with_tool_calls_round_trips() {
        let m = Message::assistant_with_calls(
            None,
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "bash".into(),
                arguments: r#"{"command":"ls"}"#.into(),
            }],
        );
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("\"content\""), "None content omitted: {json}");
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls().len(), 1);
        assert_eq!(back.tool_calls()[0].name, "bash");
    }

    #[test]
    fn tool_result_serializes_with_tool_role() {
        let m = Message::tool_result("call_1", "file.txt", false);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"role\":\"tool\""), "{json}");
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn as_text_returns_none_for_tool_result() {
        assert!(Message::tool_result("id", "out", false).as_text().is_none());
    }

    #[test]
    fn approx_tokens_divides_chars_by_four() {
        assert_eq!(Message::user("12345678").approx_tokens(), 2);
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        assert_eq!(Message::user("").approx_tokens(), 1);
    }

    #[test]
    fn approx_tokens_counts_tool_call_name_and_args() {
        let m = Message::assistant_with_calls(
            None,
            vec![ToolCallRequest {
                id: "id".into(),
                name: "aaaa".into(),
                arguments: "bbbbbbbb".into(),
            }],
        );
        // 4 + 8 chars → 3 tokens
        assert_eq!(m.approx_tokens(), 3);
    }

    #[test]
    fn tool_schema_serializes_parameters_verbatim() {
        let ts = ToolSchema {
            name: "bash".into(),
            description: "runs a command".into(),
            parameters: serde_json::json!({ "type": "object" }),
        };
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("\"type\":\"object\""));
    }
}
