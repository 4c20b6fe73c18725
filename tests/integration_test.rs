// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Integration tests across the workspace crates using the mock
/// completion clients — no network access.
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use tether_config::Config;
use tether_core::{Agent, AgentEvent};
use tether_gateway::{protocol::ClientMessage, Session};
use tether_model::ScriptedMockClient;
use tether_tools::{default_registry, ToolRegistry};

fn test_config() -> Arc<Config> {
    let mut c = Config::default();
    c.agent.restore_session = false;
    Arc::new(c)
}

fn mock_agent(client: ScriptedMockClient) -> Arc<Agent> {
    Arc::new(Agent::with_client(
        test_config(),
        Arc::new(ToolRegistry::new()),
        Arc::new(client),
    ))
}

#[tokio::test]
async fn agent_streams_scripted_response() {
    let agent = mock_agent(ScriptedMockClient::always_text("scripted reply"));
    let (tx, mut rx) = mpsc::channel(64);
    agent.prompt("hello", tx).await.unwrap();

    let mut got_text = false;
    while let Some(event) = rx.recv().await {
        if let AgentEvent::TextDelta { delta } = &event {
            assert!(delta.contains("scripted reply"));
            got_text = true;
        }
        if matches!(event, AgentEvent::AgentEnd) {
            break;
        }
    }
    assert!(got_text, "expected at least one text_delta event");
}

#[tokio::test]
async fn full_stack_prompt_through_the_session() {
    // A client frame goes through protocol parse → session dispatch →
    // agent loop → tool execution → broadcast, end to end.
    let client = ScriptedMockClient::tool_then_text(
        "call_1",
        "bash",
        r#"{"command":"echo integration"}"#,
        "all done",
    );
    let agent = Arc::new(Agent::with_client(
        test_config(),
        Arc::new(default_registry()),
        Arc::new(client),
    ));
    let session = Arc::new(Session::new(agent));

    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel(256);
    session.add_client(id, tx);

    session
        .handle_client_message(id, r#"{"type":"prompt","message":"run it"}"#)
        .await;

    let mut types = Vec::new();
    while let Some(frame) = rx.recv().await {
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let t = v["type"].as_str().unwrap().to_string();
        let done = t == "agent_end";
        if t == "tool_end" {
            assert!(v["result"].as_str().unwrap().contains("integration"));
            assert_eq!(v["is_error"], false);
        }
        types.push(t);
        if done {
            break;
        }
    }
    assert_eq!(
        types,
        vec![
            "user_message",
            "turn_start",
            "tool_start",
            "tool_end",
            "turn_end",
            "turn_start",
            "text_delta",
            "turn_end",
            "agent_end",
        ]
    );
}

#[test]
fn protocol_round_trip_matches_event_wire_format() {
    // A frame produced by the gateway parses back into the same event.
    let ev = AgentEvent::ToolEnd {
        tool_name: "bash".into(),
        call_id: "c1".into(),
        result: "ok".into(),
        is_error: false,
    };
    let frame = tether_gateway::protocol::serialize_event(&ev);
    let back: AgentEvent = serde_json::from_str(&frame).unwrap();
    assert_eq!(back, ev);
}

#[test]
fn client_frames_parse_for_every_command() {
    for (frame, expect_ok) in [
        (r#"{"type":"prompt","message":"x"}"#, true),
        (r#"{"type":"steer","message":"/compact"}"#, true),
        (r#"{"type":"abort"}"#, true),
        (r#"{"type":"context_request"}"#, true),
        (r#"{"type":"model_list_request"}"#, true),
        (r#"{"type":"prompt"}"#, false),
        (r#"{"type":"nonsense"}"#, false),
    ] {
        assert_eq!(ClientMessage::parse(frame).is_ok(), expect_ok, "{frame}");
    }
}

#[test]
fn config_defaults_are_valid() {
    let cfg = Config::default();
    assert_eq!(cfg.model.api_key_env, "TETHER_API_KEY");
    assert!(cfg.agent.compaction_threshold > 0.0);
    assert!(cfg.agent.bash_timeout_secs > 0);
    assert!(cfg.gateway.port > 0);
}

#[test]
fn catalog_backs_the_default_model() {
    let cfg = Config::default();
    let entry = tether_model::catalog::lookup(&cfg.model.name)
        .expect("default model must be in the catalog");
    assert!(entry.context_window >= 128_000);
}
