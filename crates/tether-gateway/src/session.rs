// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Binds connected clients to the single agent instance.
//!
//! Prompts are serialized through a mutex (the agent holds mutable
//! conversation state and the backend bills per call; concurrent prompts
//! would interleave messages).  Events are broadcast to every client in
//! emission order: each broadcast completes before the next event is
//! pulled off the agent channel, so a slow client throttles all clients —
//! intentional for the small client counts this gateway targets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use tether_core::{Agent, AgentEvent};
use tether_model::ModelCatalogEntry;

use crate::protocol::{serialize_event, ClientMessage, ServerMessage};

/// Bound of the agent → session event channel; bounded so broadcast
/// backpressure reaches the turn loop.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct Session {
    agent: Arc<Agent>,
    /// Outbound frame senders, one per connected client.
    clients: StdMutex<HashMap<Uuid, mpsc::Sender<String>>>,
    /// Serializes turns across all clients (FIFO admission).
    prompt_lock: Mutex<()>,
    /// Lazily fetched model catalog; write-once, benign to refetch.
    model_cache: Mutex<Option<Vec<ModelCatalogEntry>>>,
}

impl Session {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            clients: StdMutex::new(HashMap::new()),
            prompt_lock: Mutex::new(()),
            model_cache: Mutex::new(None),
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn add_client(&self, id: Uuid, tx: mpsc::Sender<String>) {
        let mut clients = self.clients.lock().unwrap();
        clients.insert(id, tx);
        info!(client = %id, total = clients.len(), "client connected");
    }

    pub fn remove_client(&self, id: Uuid) {
        let mut clients = self.clients.lock().unwrap();
        clients.remove(&id);
        info!(client = %id, total = clients.len(), "client disconnected");
    }

    /// Send a frame to every connected client concurrently.  Per-client
    /// send failures are tolerated; eviction happens when the
    /// connection's read loop observes closure, not here.
    pub async fn broadcast(&self, frame: &str) {
        let senders: Vec<mpsc::Sender<String>> =
            self.clients.lock().unwrap().values().cloned().collect();
        if senders.is_empty() {
            return;
        }
        let sends = senders.iter().map(|tx| tx.send(frame.to_string()));
        let _ = futures::future::join_all(sends).await;
    }

    /// Send a frame to one client only (context / model-list replies).
    async fn send_to(&self, id: Uuid, frame: &str) {
        let sender = self.clients.lock().unwrap().get(&id).cloned();
        if let Some(tx) = sender {
            let _ = tx.send(frame.to_string()).await;
        }
    }

    /// Parse and dispatch one client frame.
    pub async fn handle_client_message(&self, client_id: Uuid, data: &str) {
        debug!(client = %client_id, data, "client message");
        let msg = match ClientMessage::parse(data) {
            Ok(m) => m,
            Err(e) => {
                self.send_to(
                    client_id,
                    &ServerMessage::Error {
                        message: e.to_string(),
                    }
                    .to_json(),
                )
                .await;
                return;
            }
        };

        match msg {
            ClientMessage::Prompt { message } => self.handle_prompt(message).await,
            ClientMessage::Steer { message } => self.handle_steer(message).await,
            ClientMessage::Abort => {
                debug!("abort requested");
                self.agent.abort();
            }
            ClientMessage::ContextRequest => {
                let info = self.agent.context_info().await;
                self.send_to(client_id, &ServerMessage::ContextInfo(info).to_json())
                    .await;
            }
            ClientMessage::ModelListRequest => {
                let models = self.model_catalog().await;
                let frame = ServerMessage::ModelList {
                    models,
                    current: self.agent.current_model(),
                }
                .to_json();
                self.send_to(client_id, &frame).await;
            }
        }
    }

    async fn handle_prompt(&self, message: String) {
        // Echo first so every client (including the sender) sees the
        // prompt, then wait for turn admission.
        self.broadcast(
            &ServerMessage::UserMessage {
                message: message.clone(),
            }
            .to_json(),
        )
        .await;

        let _turn = self.prompt_lock.lock().await;
        let (tx, mut rx) = mpsc::channel::<AgentEvent>(EVENT_CHANNEL_CAPACITY);
        let agent = Arc::clone(&self.agent);
        let run = tokio::spawn(async move { agent.prompt(&message, tx).await });

        while let Some(ev) = rx.recv().await {
            self.broadcast(&serialize_event(&ev)).await;
        }

        match run.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.broadcast(
                    &ServerMessage::Error {
                        message: e.to_string(),
                    }
                    .to_json(),
                )
                .await;
            }
            Err(e) => {
                self.broadcast(
                    &ServerMessage::Error {
                        message: format!("prompt task failed: {e}"),
                    }
                    .to_json(),
                )
                .await;
            }
        }
    }

    async fn handle_steer(&self, message: String) {
        let trimmed = message.trim();
        if trimmed == "/reload" {
            self.handle_reload().await;
            return;
        }
        if let Some(model) = trimmed.strip_prefix("/model ") {
            let model = model.trim().to_string();
            info!(%model, "model switched");
            self.agent.set_model(model.clone());
            self.broadcast(&ServerMessage::ModelSet { model }.to_json())
                .await;
            return;
        }

        let (tx, mut rx) = mpsc::channel::<AgentEvent>(EVENT_CHANNEL_CAPACITY);
        let agent = Arc::clone(&self.agent);
        let msg = message.clone();
        let run = tokio::spawn(async move { agent.steer(&msg, tx).await });

        while let Some(ev) = rx.recv().await {
            self.broadcast(&serialize_event(&ev)).await;
        }
        if let Ok(Err(e)) = run.await {
            self.broadcast(
                &ServerMessage::Error {
                    message: e.to_string(),
                }
                .to_json(),
            )
            .await;
        }
    }

    /// `/reload`: rebuild the completion client while preserving the
    /// conversation, model, and system prompt.
    async fn handle_reload(&self) {
        self.broadcast(&ServerMessage::ReloadStart.to_json()).await;
        let (success, message) = match self.agent.reload() {
            Ok(()) => (true, "completion client rebuilt".to_string()),
            Err(e) => (false, e.to_string()),
        };
        self.broadcast(&ServerMessage::ReloadEnd { success, message }.to_json())
            .await;
    }

    async fn model_catalog(&self) -> Vec<ModelCatalogEntry> {
        let mut cache = self.model_cache.lock().await;
        if let Some(models) = cache.as_ref() {
            return models.clone();
        }
        let models = self.agent.list_models().await;
        *cache = Some(models.clone());
        models
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
