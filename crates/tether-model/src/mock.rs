// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    client::ResponseStream, CompletionClient, CompletionError, CompletionRequest, ResponseEvent,
};

/// A pre-scripted mock completion client.  Each `complete` call pops the
/// next response script from the front of the queue, so tests can specify
/// exact event sequences — including tool calls — without network access.
pub struct ScriptedMockClient {
    scripts: Arc<Mutex<Vec<Vec<ResponseEvent>>>>,
    /// The last `CompletionRequest` seen, for request-shape assertions.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    /// Number of `complete` / `complete_text` calls made.
    pub calls: Arc<Mutex<u32>>,
}

impl ScriptedMockClient {
    /// The outer `Vec` is the ordered list of calls; the inner `Vec` is
    /// the event sequence emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Convenience: a client that always streams a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Self::text_script(reply)])
    }

    /// Event script for a plain text reply ending with `stop`.
    pub fn text_script(reply: impl Into<String>) -> Vec<ResponseEvent> {
        vec![
            ResponseEvent::TextDelta(reply.into()),
            ResponseEvent::Finish("stop".into()),
            ResponseEvent::Done,
        ]
    }

    /// Event script for one complete tool call ending with `tool_calls`.
    pub fn tool_call_script(
        id: impl Into<String>,
        name: impl Into<String>,
        args_json: impl Into<String>,
    ) -> Vec<ResponseEvent> {
        vec![
            ResponseEvent::ToolCallDelta {
                index: 0,
                id: Some(id.into()),
                name: Some(name.into()),
                arguments: args_json.into(),
            },
            ResponseEvent::Finish("tool_calls".into()),
            ResponseEvent::Done,
        ]
    }

    /// Convenience: round 1 emits a tool call, round 2 a text reply.
    pub fn tool_then_text(
        id: impl Into<String>,
        name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Self::tool_call_script(id, name, args_json),
            Self::text_script(final_text),
        ])
    }

    fn next_script(&self, req: CompletionRequest) -> Vec<ResponseEvent> {
        *self.calls.lock().unwrap() += 1;
        *self.last_request.lock().unwrap() = Some(req);
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            Self::text_script("[no more scripts]")
        } else {
            scripts.remove(0)
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedMockClient {
    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, CompletionError> {
        let events = self.next_script(req);
        let wrapped: Vec<Result<ResponseEvent, CompletionError>> =
            events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

/// A mock whose stream is fed manually through a channel.  Tests use this
/// to hold a stream open while they inject aborts or mid-stream errors at
/// precise points.
pub struct ChannelMockClient {
    rx: Mutex<Option<mpsc::Receiver<Result<ResponseEvent, CompletionError>>>>,
}

impl ChannelMockClient {
    /// Returns the client and the sender that drives its single stream.
    pub fn new() -> (Self, mpsc::Sender<Result<ResponseEvent, CompletionError>>) {
        let (tx, rx) = mpsc::channel(32);
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl CompletionClient for ChannelMockClient {
    async fn complete(&self, _req: CompletionRequest) -> Result<ResponseStream, CompletionError> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("ChannelMockClient supports exactly one complete() call");
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// A mock that fails every request with the given HTTP status.
pub struct FailingMockClient {
    pub status: u16,
    pub body: String,
}

#[async_trait]
impl CompletionClient for FailingMockClient {
    async fn complete(&self, _req: CompletionRequest) -> Result<ResponseStream, CompletionError> {
        Err(CompletionError::Status {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
