// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use tether_config::Config;
use tether_model::{
    catalog, CompletionClient, CompletionRequest, Message, ModelCatalogEntry, OpenAiClient,
    ResponseEvent, ToolCallRequest, ToolSchema,
};
use tether_tools::{ToolOutput, ToolRegistry};

use crate::{
    compact,
    context::{self, ContextInfo},
    events::AgentEvent,
    prompts, snapshot,
};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent is not running; call start() first")]
    NotRunning,
    #[error("credential environment variable {0} is not set")]
    MissingCredentials(String),
}

/// The agent: one conversation with the completion backend, a tool
/// registry, and the turn loop that ties them together.
///
/// One instance exists per gateway process.  All methods take `&self`;
/// turn-level serialization across clients is the session's prompt mutex,
/// not anything in here.  The conversation itself is only mutated by the
/// turn loop (and by compaction, which runs inside it or inline from a
/// `/compact` steer while holding the history lock).
pub struct Agent {
    config: Arc<Config>,
    tools: Arc<ToolRegistry>,
    system_prompt: StdMutex<String>,
    model: StdMutex<String>,
    history: Mutex<Vec<Message>>,
    /// User-injected messages awaiting the next turn-loop boundary.
    steer_queue: StdMutex<VecDeque<String>>,
    /// Edge-triggered per turn: cleared by `prompt()`, checked before the
    /// stream opens, before each chunk, and before each tool execution.
    abort: AtomicBool,
    running: AtomicBool,
    client: StdMutex<Option<Arc<dyn CompletionClient>>>,
}

impl Agent {
    pub fn new(config: Arc<Config>, tools: Arc<ToolRegistry>) -> Self {
        let system_prompt = prompts::system_prompt(config.agent.system_prompt.as_deref());
        let model = config.model.name.clone();
        Self {
            config,
            tools,
            system_prompt: StdMutex::new(system_prompt),
            model: StdMutex::new(model),
            history: Mutex::new(Vec::new()),
            steer_queue: StdMutex::new(VecDeque::new()),
            abort: AtomicBool::new(false),
            running: AtomicBool::new(false),
            client: StdMutex::new(None),
        }
    }

    /// Construct an already-running agent around an injected completion
    /// client.  Used by tests and by embedders that manage credentials
    /// themselves.
    pub fn with_client(
        config: Arc<Config>,
        tools: Arc<ToolRegistry>,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        let agent = Self::new(config, tools);
        *agent.client.lock().unwrap() = Some(client);
        agent.running.store(true, Ordering::SeqCst);
        agent
    }

    /// Validate credentials, build the completion client, optionally
    /// restore the session snapshot, and mark the agent running.
    pub async fn start(&self) -> Result<(), AgentError> {
        let var = &self.config.model.api_key_env;
        let key =
            std::env::var(var).map_err(|_| AgentError::MissingCredentials(var.clone()))?;
        let client: Arc<dyn CompletionClient> =
            Arc::new(OpenAiClient::from_config(&self.config.model, key));
        *self.client.lock().unwrap() = Some(client);

        if self.config.agent.restore_session {
            let path = self.snapshot_path();
            match snapshot::load(&path) {
                Ok(Some(snap)) => {
                    info!(
                        path = %path.display(),
                        messages = snap.messages.len(),
                        "restored session snapshot"
                    );
                    *self.model.lock().unwrap() = snap.model;
                    *self.system_prompt.lock().unwrap() = snap.system_prompt;
                    *self.history.lock().await = snap.messages;
                }
                Ok(None) => {}
                Err(e) => warn!("ignoring unreadable session snapshot: {e}"),
            }
        }

        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop the agent: abort any in-flight turn at its next boundary and
    /// drop the completion client.
    pub fn stop(&self) {
        self.abort.store(true, Ordering::SeqCst);
        *self.client.lock().unwrap() = None;
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cancellation of the in-flight turn.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn current_model(&self) -> String {
        self.model.lock().unwrap().clone()
    }

    pub fn set_model(&self, id: impl Into<String>) {
        *self.model.lock().unwrap() = id.into();
    }

    /// Rebuild the completion client from the environment, preserving
    /// conversation, model, and system prompt.  Backs `/reload`.
    pub fn reload(&self) -> Result<(), AgentError> {
        let var = &self.config.model.api_key_env;
        let key =
            std::env::var(var).map_err(|_| AgentError::MissingCredentials(var.clone()))?;
        let client: Arc<dyn CompletionClient> =
            Arc::new(OpenAiClient::from_config(&self.config.model, key));
        *self.client.lock().unwrap() = Some(client);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Pre-load conversation history (snapshot restore, tests).
    pub async fn seed_history(&self, messages: Vec<Message>) {
        *self.history.lock().await = messages;
    }

    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    /// Per-role token estimates and the model's context window.
    pub async fn context_info(&self) -> ContextInfo {
        let history = self.history.lock().await;
        context::build_context_info(
            &self.system_prompt(),
            &self.model_schemas(),
            &history,
            catalog::context_window(&self.current_model()) as usize,
        )
    }

    /// Model catalog: live from the backend when possible, static
    /// otherwise.
    pub async fn list_models(&self) -> Vec<ModelCatalogEntry> {
        match self.client() {
            Ok(client) => client
                .list_models()
                .await
                .unwrap_or_else(|_| catalog::static_catalog()),
            Err(_) => catalog::static_catalog(),
        }
    }

    /// Write the session snapshot and return its path.
    pub async fn save_snapshot(&self) -> anyhow::Result<PathBuf> {
        let path = self.snapshot_path();
        let snap = snapshot::SessionSnapshot {
            model: self.current_model(),
            system_prompt: self.system_prompt(),
            messages: self.history().await,
            saved_at: Some(chrono::Utc::now()),
        };
        snapshot::save(&path, &snap)?;
        Ok(path)
    }

    // ── Prompt ────────────────────────────────────────────────────────────────

    /// Run one prompt to completion, streaming events through `tx`.
    ///
    /// Exactly one `AgentEnd` is emitted per call, on every path.
    pub async fn prompt(
        &self,
        text: &str,
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<(), AgentError> {
        let client = self.client()?;
        self.abort.store(false, Ordering::SeqCst);
        self.history.lock().await.push(Message::user(text));
        let _ = tx.send(AgentEvent::TurnStart).await;

        loop {
            // Steer messages enter only at this boundary, never mid-tool.
            let steered: Vec<String> =
                self.steer_queue.lock().unwrap().drain(..).collect();
            if !steered.is_empty() {
                let mut history = self.history.lock().await;
                for s in steered {
                    debug!(text = %s, "injecting steer message");
                    history.push(Message::user(s));
                }
            }

            if self.aborted() {
                let _ = tx.send(AgentEvent::TurnEnd).await;
                let _ = tx.send(AgentEvent::AgentEnd).await;
                return Ok(());
            }

            let schemas = self.model_schemas();
            let window = catalog::context_window(&self.current_model()) as f32;
            let est = self.estimated_tokens(&schemas).await;
            if est as f32 > window * self.config.agent.compaction_threshold {
                let _ = tx.send(AgentEvent::CompactionStart).await;
                let ev = match self.compact(&client).await {
                    Ok((summary, tokens_before)) => AgentEvent::CompactionEnd {
                        summary,
                        tokens_before,
                    },
                    Err(e) => {
                        // The turn continues uncompacted; the failure text
                        // goes to the clients instead of a summary.
                        warn!("compaction failed: {e}");
                        AgentEvent::CompactionEnd {
                            summary: format!("compaction failed: {e}"),
                            tokens_before: est,
                        }
                    }
                };
                let _ = tx.send(ev).await;
            }

            let req = CompletionRequest {
                model: self.current_model(),
                system_prompt: self.system_prompt(),
                messages: self.history.lock().await.clone(),
                tools: schemas,
                stream: true,
            };
            let mut stream = match client.complete(req).await {
                Ok(s) => s,
                Err(e) => {
                    let _ = tx
                        .send(AgentEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    let _ = tx.send(AgentEvent::AgentEnd).await;
                    return Ok(());
                }
            };

            let mut text_buf = String::new();
            let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();
            let mut finish_reason: Option<String> = None;

            while let Some(item) = stream.next().await {
                if self.aborted() {
                    let _ = tx.send(AgentEvent::TurnEnd).await;
                    let _ = tx.send(AgentEvent::AgentEnd).await;
                    return Ok(());
                }
                match item {
                    Ok(ResponseEvent::TextDelta(delta)) => {
                        if !delta.is_empty() {
                            text_buf.push_str(&delta);
                            let _ = tx.send(AgentEvent::TextDelta { delta }).await;
                        }
                    }
                    Ok(ResponseEvent::ToolCallDelta {
                        index,
                        id,
                        name,
                        arguments,
                    }) => {
                        let slot = pending.entry(index).or_default();
                        if let Some(id) = id {
                            slot.id = id;
                        }
                        if let Some(name) = name {
                            slot.name = name;
                        }
                        slot.arguments.push_str(&arguments);
                    }
                    Ok(ResponseEvent::Finish(reason)) => finish_reason = Some(reason),
                    Ok(ResponseEvent::Done) => break,
                    Err(e) => {
                        let _ = tx
                            .send(AgentEvent::Error {
                                message: e.to_string(),
                            })
                            .await;
                        let _ = tx.send(AgentEvent::AgentEnd).await;
                        return Ok(());
                    }
                }
            }

            let tool_calls = flush_tool_calls(pending);
            let assistant_text = if text_buf.is_empty() {
                None
            } else {
                Some(text_buf)
            };
            self.history
                .lock()
                .await
                .push(Message::assistant_with_calls(
                    assistant_text,
                    tool_calls.clone(),
                ));

            if tool_calls.is_empty() || finish_reason.as_deref() != Some("tool_calls") {
                break;
            }

            // Tools run sequentially in index order; results are recorded
            // even when a later abort lands, so disk state stays coherent.
            for call in &tool_calls {
                if self.aborted() {
                    let _ = tx.send(AgentEvent::TurnEnd).await;
                    let _ = tx.send(AgentEvent::AgentEnd).await;
                    return Ok(());
                }
                let args: Value = serde_json::from_str(&call.arguments)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                let _ = tx
                    .send(AgentEvent::ToolStart {
                        tool_name: call.name.clone(),
                        call_id: call.id.clone(),
                        args: args.clone(),
                    })
                    .await;
                let output = match self.tools.get(&call.name) {
                    Some(tool) => tool.execute(&args).await,
                    None => ToolOutput::err(format!("Unknown tool: {}", call.name)),
                };
                let _ = tx
                    .send(AgentEvent::ToolEnd {
                        tool_name: call.name.clone(),
                        call_id: call.id.clone(),
                        result: output.output.clone(),
                        is_error: output.is_error,
                    })
                    .await;
                self.history.lock().await.push(Message::tool_result(
                    &call.id,
                    &output.output,
                    output.is_error,
                ));
            }

            let _ = tx.send(AgentEvent::TurnEnd).await;
            let _ = tx.send(AgentEvent::TurnStart).await;
        }

        let _ = tx.send(AgentEvent::TurnEnd).await;
        let _ = tx.send(AgentEvent::AgentEnd).await;
        Ok(())
    }

    // ── Steering ──────────────────────────────────────────────────────────────

    /// Handle an out-of-band user instruction.
    ///
    /// `/compact` runs compaction inline; `/model-info` replies with
    /// catalog metadata; anything else is queued and drained at the next
    /// turn-loop boundary.
    pub async fn steer(
        &self,
        text: &str,
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<(), AgentError> {
        if !self.is_running() {
            return Err(AgentError::NotRunning);
        }
        match text.trim() {
            "/compact" => {
                let client = self.client()?;
                let _ = tx.send(AgentEvent::CompactionStart).await;
                let ev = match self.compact(&client).await {
                    Ok((summary, tokens_before)) => AgentEvent::CompactionEnd {
                        summary,
                        tokens_before,
                    },
                    Err(e) => {
                        let schemas = self.model_schemas();
                        AgentEvent::CompactionEnd {
                            summary: format!("compaction failed: {e}"),
                            tokens_before: self.estimated_tokens(&schemas).await,
                        }
                    }
                };
                let _ = tx.send(ev).await;
            }
            "/model-info" => {
                let model = self.current_model();
                let entry = self
                    .list_models()
                    .await
                    .into_iter()
                    .find(|e| e.id == model)
                    .or_else(|| catalog::lookup(&model))
                    .unwrap_or_else(|| ModelCatalogEntry {
                        id: model.clone(),
                        name: model,
                        context_window: catalog::DEFAULT_CONTEXT_WINDOW,
                        max_output_tokens: 0,
                        description: String::new(),
                    });
                let _ = tx.send(AgentEvent::ModelInfo { model_info: entry }).await;
            }
            other if !other.is_empty() => {
                self.steer_queue
                    .lock()
                    .unwrap()
                    .push_back(other.to_string());
            }
            _ => {}
        }
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn client(&self) -> Result<Arc<dyn CompletionClient>, AgentError> {
        self.client
            .lock()
            .unwrap()
            .clone()
            .ok_or(AgentError::NotRunning)
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    fn system_prompt(&self) -> String {
        self.system_prompt.lock().unwrap().clone()
    }

    fn snapshot_path(&self) -> PathBuf {
        self.config
            .agent
            .session_file
            .clone()
            .unwrap_or_else(snapshot::default_path)
    }

    fn model_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .schemas()
            .into_iter()
            .map(|s| ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect()
    }

    async fn estimated_tokens(&self, schemas: &[ToolSchema]) -> usize {
        let history = self.history.lock().await;
        context::estimate_prompt_tokens(&self.system_prompt(), schemas, &history)
    }

    /// Summarize everything older than the recent-token budget and
    /// replace it with a synthetic summary exchange.  Holds the history
    /// lock for the duration so the turn loop never observes a
    /// half-rebuilt conversation.
    async fn compact(
        &self,
        client: &Arc<dyn CompletionClient>,
    ) -> anyhow::Result<(String, usize)> {
        let mut history = self.history.lock().await;
        let tokens_before = context::estimate_prompt_tokens(
            &self.system_prompt(),
            &self.model_schemas(),
            &history,
        );

        let cut = compact::find_cut_index(&history, self.config.agent.recent_token_budget);
        if cut == 0 {
            return Ok((compact::NOTHING_TO_COMPACT.to_string(), tokens_before));
        }

        let prefix = history[..cut].to_vec();
        let suffix = history[cut..].to_vec();
        debug!(cut, total = history.len(), "compacting conversation prefix");

        let req = CompletionRequest {
            model: self.current_model(),
            system_prompt: compact::SUMMARIZE_SYSTEM_PROMPT.to_string(),
            messages: compact::summary_request_messages(&prefix),
            tools: Vec::new(),
            stream: false,
        };
        let summary = client.complete_text(req).await?;
        if summary.is_empty() {
            anyhow::bail!("summary call returned empty text");
        }

        *history = compact::rebuild_with_summary(&summary, suffix);
        Ok((summary, tokens_before))
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Order accumulated tool calls by stream index and drop anything that
/// cannot be dispatched.  An empty id gets a synthetic fallback so the
/// turn can still complete.
fn flush_tool_calls(pending: HashMap<u32, PendingToolCall>) -> Vec<ToolCallRequest> {
    let mut sorted: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
    sorted.sort_by_key(|(idx, _)| *idx);

    let mut calls = Vec::with_capacity(sorted.len());
    for (i, (_, ptc)) in sorted.into_iter().enumerate() {
        if ptc.name.is_empty() {
            warn!(call_id = %ptc.id, "dropping tool call with empty name; cannot dispatch");
            continue;
        }
        let id = if ptc.id.is_empty() {
            warn!(tool_name = %ptc.name, "tool call had empty id; generating synthetic id");
            format!("call_synthetic_{i}")
        } else {
            ptc.id
        };
        calls.push(ToolCallRequest {
            id,
            name: ptc.name,
            arguments: ptc.arguments,
        });
    }
    calls
}
