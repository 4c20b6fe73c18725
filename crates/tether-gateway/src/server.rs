// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! WebSocket listener: accepts connections and hands each one to the
//! session.
//!
//! Per connection there is one outbound frame channel (drained into the
//! socket by the select loop below) and one handler task per incoming
//! frame, so a long-running prompt never blocks an abort sent on the same
//! connection.  On disconnect, outstanding handler tasks are aborted and
//! the client is deregistered.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};
use uuid::Uuid;

use tether_config::Config;
use tether_core::Agent;

use crate::session::Session;

/// Outbound frames buffered per client before backpressure reaches the
/// broadcast (and through it, the turn loop).
const OUTBOUND_CAPACITY: usize = 64;

/// Run the gateway until SIGINT/SIGTERM.
///
/// Binds first, then starts the agent, so both failure modes surface
/// before any client can connect — and both exit non-zero.
pub async fn run(config: Arc<Config>, agent: Arc<Agent>) -> anyhow::Result<()> {
    let session = Arc::new(Session::new(Arc::clone(&agent)));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(Arc::clone(&session));

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind listen socket {addr}"))?;

    agent.start().await?;
    info!("gateway listening on ws://{addr}/ws");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    agent.stop();
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(session): State<Arc<Session>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

async fn handle_socket(mut socket: WebSocket, session: Arc<Session>) {
    let client_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    session.add_client(client_id, tx);

    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let session = Arc::clone(&session);
                    handlers.spawn(async move {
                        session.handle_client_message(client_id, &text).await;
                    });
                }
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // binary frames ignored
                Some(Err(e)) => {
                    debug!(client = %client_id, "websocket recv error: {e}");
                    break;
                }
            },
            outgoing = rx.recv() => match outgoing {
                Some(frame) => {
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    handlers.abort_all();
    session.remove_client(client_id);
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return std::future::pending().await,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
