// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming client for OpenAI-compatible chat completion endpoints.
//!
//! Speaks the standard `/chat/completions` SSE wire format with bearer
//! auth.  Transient backend failures (transport errors, HTTP 429/5xx) are
//! retried with exponential backoff before anything is surfaced to the
//! agent loop; non-retryable statuses surface immediately with the status
//! attached.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    catalog::{self, ModelCatalogEntry},
    client::ResponseStream,
    CompletionClient, CompletionError, CompletionRequest, Message, ResponseEvent,
};

/// Total attempts per request, including the first.
const MAX_ATTEMPTS: u32 = 3;
/// First backoff delay; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct OpenAiClient {
    api_key: String,
    /// Full chat completions URL, derived from the configured base.
    chat_url: String,
    /// Full models list URL.
    models_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// `base_url` ends before `/chat/completions`, e.g.
    /// `https://api.openai.com/v1`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            api_key: api_key.into(),
            chat_url: format!("{base}/chat/completions"),
            models_url: format!("{base}/models"),
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    /// Construct from the gateway model configuration and a pre-resolved
    /// API key.
    pub fn from_config(cfg: &tether_config::ModelConfig, api_key: impl Into<String>) -> Self {
        Self::new(api_key, &cfg.base_url, cfg.max_tokens, cfg.temperature)
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": req.model,
            "messages": build_wire_messages(&req.system_prompt, &req.messages),
            "stream": req.stream,
        });
        if let Some(mt) = self.max_tokens {
            body["max_tokens"] = json!(mt);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }
        body
    }

    /// POST `body` to the chat endpoint, retrying retryable failures with
    /// exponential backoff.  Returns the successful response or the first
    /// non-retryable error.
    async fn post_with_retry(&self, body: &Value) -> Result<reqwest::Response, CompletionError> {
        let mut delay = INITIAL_BACKOFF;
        let mut last_error: Option<CompletionError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .client
                .post(&self.chat_url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            let err = match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    CompletionError::Status { status, body }
                }
                Err(e) => CompletionError::from(e),
            };

            if !err.is_retryable() {
                return Err(err);
            }
            warn!(attempt, %err, "completion request failed; will retry");
            last_error = Some(err);

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }

        Err(CompletionError::MaxRetries {
            attempts: MAX_ATTEMPTS,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".into()),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, CompletionError> {
        let body = self.build_body(&req);
        debug!(
            model = %req.model,
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            "opening completion stream"
        );

        let resp = self.post_with_retry(&body).await?;

        // SSE events can be split across TCP packets.  Maintain a line
        // buffer across chunks; emit events only for complete lines.
        let event_stream = resp
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let events: Vec<Result<ResponseEvent, CompletionError>> = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(CompletionError::from(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }

    /// Non-streaming completion; used for compaction summaries.
    async fn complete_text(&self, req: CompletionRequest) -> Result<String, CompletionError> {
        let mut req = req;
        req.stream = false;
        let body = self.build_body(&req);
        let resp = self.post_with_retry(&body).await?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| CompletionError::Stream(format!("invalid response body: {e}")))?;
        Ok(v["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// List models via `GET /models`, enriched with static catalog
    /// metadata.  Any failure falls back to the catalog so the gateway's
    /// model list always resolves.
    async fn list_models(&self) -> Result<Vec<ModelCatalogEntry>, CompletionError> {
        let catalog_entries = catalog::static_catalog();

        let resp = match self
            .client
            .get(&self.models_url)
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return Ok(catalog_entries),
        };

        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(_) => return Ok(catalog_entries),
        };

        let mut entries: Vec<ModelCatalogEntry> = Vec::new();
        if let Some(data) = body["data"].as_array() {
            for item in data {
                let id = match item["id"].as_str() {
                    Some(s) => s.to_string(),
                    None => continue,
                };
                if let Some(known) = catalog_entries.iter().find(|e| e.id == id) {
                    entries.push(known.clone());
                } else {
                    entries.push(ModelCatalogEntry {
                        id: id.clone(),
                        name: id,
                        context_window: 0,
                        max_output_tokens: 0,
                        description: String::new(),
                    });
                }
            }
        }

        if entries.is_empty() {
            return Ok(catalog_entries);
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}

// ─── SSE parsing ──────────────────────────────────────────────────────────────

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// Any trailing incomplete line is left in `buf` so the next TCP chunk can
/// extend it.
fn drain_complete_sse_lines(buf: &mut String) -> Vec<Result<ResponseEvent, CompletionError>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        events.extend(parse_sse_data_line(&line).into_iter().map(Ok));
    }
    events
}

/// Parse one complete SSE `data:` line into zero or more events.
///
/// Empty lines, comments, and unparseable payloads yield nothing.
fn parse_sse_data_line(line: &str) -> Vec<ResponseEvent> {
    let Some(data) = line.strip_prefix("data: ") else {
        return Vec::new();
    };
    let data = data.trim();
    if data.is_empty() {
        return Vec::new();
    }
    if data == "[DONE]" {
        return vec![ResponseEvent::Done];
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) => parse_sse_chunk(&v),
        Err(_) => Vec::new(),
    }
}

/// Parse a chunk object into its events.
///
/// A single chunk may carry a content delta AND a `finish_reason`, so this
/// returns a list: the delta first, the finish marker last.
fn parse_sse_chunk(v: &Value) -> Vec<ResponseEvent> {
    let mut events = Vec::new();
    let choice = &v["choices"][0];
    let delta = &choice["delta"];

    if let Some(tool_calls) = delta.get("tool_calls") {
        if let Some(tc) = tool_calls.get(0) {
            events.push(ResponseEvent::ToolCallDelta {
                index: tc["index"].as_u64().unwrap_or(0) as u32,
                id: non_empty_str(&tc["id"]),
                name: non_empty_str(&tc["function"]["name"]),
                arguments: tc["function"]["arguments"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            });
        }
    } else if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        events.push(ResponseEvent::TextDelta(text.to_string()));
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        events.push(ResponseEvent::Finish(reason.to_string()));
    }

    events
}

fn non_empty_str(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

// ─── Wire message building ────────────────────────────────────────────────────

/// Convert the system prompt + conversation into the OpenAI wire-format
/// message array.  Extracted as a free function so it can be unit-tested
/// without HTTP requests.
fn build_wire_messages(system_prompt: &str, messages: &[Message]) -> Vec<Value> {
    let mut result = Vec::with_capacity(messages.len() + 1);
    result.push(json!({ "role": "system", "content": system_prompt }));

    for m in messages {
        let v = match m {
            Message::User { content } => json!({ "role": "user", "content": content }),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut obj = json!({ "role": "assistant" });
                if let Some(text) = content {
                    obj["content"] = json!(text);
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments,
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(calls);
                }
                obj
            }
            Message::ToolResult {
                tool_call_id,
                content,
                ..
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        };
        result.push(v);
    }

    result
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCallRequest;

    // ── Chunk parsing ─────────────────────────────────────────────────────────

    #[test]
    fn parse_text_delta() {
        let v = json!({ "choices": [{ "delta": { "content": "hello" } }] });
        let evs = parse_sse_chunk(&v);
        assert_eq!(evs, vec![ResponseEvent::TextDelta("hello".into())]);
    }

    #[test]
    fn parse_chunk_without_content_yields_nothing() {
        let v = json!({ "choices": [{ "delta": {} }] });
        assert!(parse_sse_chunk(&v).is_empty());
    }

    #[test]
    fn parse_tool_call_start_carries_id_and_name() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_abc",
                        "function": { "name": "bash", "arguments": "" }
                    }]
                }
            }]
        });
        let evs = parse_sse_chunk(&v);
        assert_eq!(
            evs,
            vec![ResponseEvent::ToolCallDelta {
                index: 0,
                id: Some("call_abc".into()),
                name: Some("bash".into()),
                arguments: String::new(),
            }]
        );
    }

    #[test]
    fn parse_tool_call_argument_fragment_has_no_id() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 1,
                        "function": { "arguments": "{\"command\": " }
                    }]
                }
            }]
        });
        let evs = parse_sse_chunk(&v);
        assert_eq!(
            evs,
            vec![ResponseEvent::ToolCallDelta {
                index: 1,
                id: None,
                name: None,
                arguments: "{\"command\": ".into(),
            }]
        );
    }

    #[test]
    fn empty_string_id_is_treated_as_absent() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "",
                        "function": { "name": "", "arguments": "x" }
                    }]
                }
            }]
        });
        match &parse_sse_chunk(&v)[0] {
            ResponseEvent::ToolCallDelta { id, name, .. } => {
                assert!(id.is_none());
                assert!(name.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn finish_reason_is_emitted_after_delta() {
        let v = json!({
            "choices": [{
                "delta": { "content": "bye" },
                "finish_reason": "stop"
            }]
        });
        let evs = parse_sse_chunk(&v);
        assert_eq!(
            evs,
            vec![
                ResponseEvent::TextDelta("bye".into()),
                ResponseEvent::Finish("stop".into()),
            ]
        );
    }

    #[test]
    fn finish_only_chunk_emits_finish() {
        let v = json!({ "choices": [{ "delta": {}, "finish_reason": "tool_calls" }] });
        assert_eq!(
            parse_sse_chunk(&v),
            vec![ResponseEvent::Finish("tool_calls".into())]
        );
    }

    // ── Line buffering ────────────────────────────────────────────────────────

    #[test]
    fn complete_line_is_drained() {
        let mut buf = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n".to_string();
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Ok(ResponseEvent::TextDelta(t)) if t == "hi"
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_line_stays_buffered() {
        let partial = "data: {\"choices\":[{\"delta\":{\"content\":\"hel";
        let mut buf = partial.to_string();
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
        assert_eq!(buf, partial);
    }

    #[test]
    fn event_split_across_two_chunks_is_reassembled() {
        let full = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"bash","arguments":""}}]}}]}"#;
        let split = full.len() / 2;
        let mut buf = String::new();

        buf.push_str(&full[..split]);
        assert!(drain_complete_sse_lines(&mut buf).is_empty());

        buf.push_str(&full[split..]);
        buf.push('\n');
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(ResponseEvent::ToolCallDelta { id, name, .. }) => {
                assert_eq!(id.as_deref(), Some("call_1"));
                assert_eq!(name.as_deref(), Some("bash"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn multiple_events_in_one_chunk_all_parse() {
        let mut buf = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: [DONE]\n",
        )
        .to_string();
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[2], Ok(ResponseEvent::Done)));
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let mut buf = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n".to_string();
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut buf = ": keep-alive comment\n\n".to_string();
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
    }

    // ── Wire message building ─────────────────────────────────────────────────

    #[test]
    fn system_prompt_is_prepended() {
        let wire = build_wire_messages("be helpful", &[Message::user("hi")]);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "be helpful");
        assert_eq!(wire[1]["role"], "user");
    }

    #[test]
    fn assistant_tool_calls_use_function_wrapper() {
        let msg = Message::assistant_with_calls(
            None,
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "bash".into(),
                arguments: r#"{"command":"ls"}"#.into(),
            }],
        );
        let wire = build_wire_messages("", &[msg]);
        let calls = wire[1]["tool_calls"].as_array().unwrap();
        assert_eq!(calls[0]["id"], "call_1");
        assert_eq!(calls[0]["type"], "function");
        assert_eq!(calls[0]["function"]["name"], "bash");
        assert!(wire[1].get("content").is_none(), "no content field when None");
    }

    #[test]
    fn tool_result_maps_to_tool_role() {
        let wire = build_wire_messages("", &[Message::tool_result("call_1", "file.txt", false)]);
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "call_1");
        assert_eq!(wire[1]["content"], "file.txt");
    }

    #[test]
    fn tools_omitted_from_body_when_empty() {
        let c = OpenAiClient::new("k", "http://localhost:1/v1", None, None);
        let body = c.build_body(&CompletionRequest {
            model: "m".into(),
            stream: true,
            ..Default::default()
        });
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tools_included_when_present() {
        let c = OpenAiClient::new("k", "http://localhost:1/v1", None, None);
        let body = c.build_body(&CompletionRequest {
            model: "m".into(),
            tools: vec![crate::ToolSchema {
                name: "bash".into(),
                description: "d".into(),
                parameters: json!({ "type": "object" }),
            }],
            stream: true,
            ..Default::default()
        });
        assert_eq!(body["tools"][0]["function"]["name"], "bash");
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let c = OpenAiClient::new("k", "http://localhost:9999/v1/", None, None);
        assert_eq!(c.chat_url, "http://localhost:9999/v1/chat/completions");
        assert_eq!(c.models_url, "http://localhost:9999/v1/models");
    }

    // ── Retry behaviour against a local socket ────────────────────────────────

    /// Minimal one-shot HTTP responder: accepts `n` connections and answers
    /// each with the corresponding canned response, counting the requests.
    async fn serve_responses(
        responses: Vec<String>,
    ) -> (String, std::sync::Arc<std::sync::atomic::AtomicU32>) {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                hits_clone.fetch_add(1, Ordering::SeqCst);
                // Read the request until the body has arrived (best effort).
                let mut discard = [0u8; 8192];
                let _ = sock.read(&mut discard).await;
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });

        (format!("http://{addr}/v1"), hits)
    }

    fn http_response(status_line: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len(),
        )
    }

    #[tokio::test]
    async fn retry_then_succeed_makes_exactly_two_calls() {
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"recovered\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (base_url, hits) = serve_responses(vec![
            http_response("429 Too Many Requests", "text/plain", "slow down"),
            http_response("200 OK", "text/event-stream", sse_body),
        ])
        .await;

        let client = OpenAiClient::new("test-key", &base_url, None, None);
        let mut stream = client
            .complete(CompletionRequest {
                model: "m".into(),
                messages: vec![Message::user("hi")],
                stream: true,
                ..Default::default()
            })
            .await
            .expect("second attempt should succeed");

        let mut text = String::new();
        while let Some(ev) = stream.next().await {
            match ev.unwrap() {
                ResponseEvent::TextDelta(d) => text.push_str(&d),
                ResponseEvent::Done => break,
                _ => {}
            }
        }
        assert_eq!(text, "recovered");
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_status_surfaces_immediately() {
        let (base_url, hits) = serve_responses(vec![http_response(
            "404 Not Found",
            "text/plain",
            "no such model",
        )])
        .await;

        let client = OpenAiClient::new("test-key", &base_url, None, None);
        let err = match client
            .complete(CompletionRequest {
                model: "m".into(),
                stream: true,
                ..Default::default()
            })
            .await
        {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };

        match err {
            CompletionError::Status { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("no such model"));
            }
            other => panic!("expected Status error, got {other}"),
        }
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_max_retries() {
        let too_many = http_response("429 Too Many Requests", "text/plain", "");
        let (base_url, hits) =
            serve_responses(vec![too_many.clone(), too_many.clone(), too_many]).await;

        let client = OpenAiClient::new("test-key", &base_url, None, None);
        let err = match client
            .complete(CompletionRequest {
                model: "m".into(),
                stream: true,
                ..Default::default()
            })
            .await
        {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };

        assert!(
            matches!(err, CompletionError::MaxRetries { attempts: 3, .. }),
            "expected MaxRetries, got {err}"
        );
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn complete_text_parses_non_streaming_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"summary text"}}]}"#;
        let (base_url, _) =
            serve_responses(vec![http_response("200 OK", "application/json", body)]).await;

        let client = OpenAiClient::new("test-key", &base_url, None, None);
        let text = client
            .complete_text(CompletionRequest {
                model: "m".into(),
                messages: vec![Message::user("summarize")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(text, "summary text");
    }
}
