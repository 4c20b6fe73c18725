// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Completion backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name forwarded to the completion endpoint.
    #[serde(default = "default_model")]
    pub name: String,
    /// API base that ends before `/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable that holds the API key (read at startup).
    /// The key itself never appears in config files.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0).
    pub temperature: Option<f32>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "TETHER_API_KEY".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Override for the built-in system prompt.  The
    /// `TETHER_SYSTEM_PROMPT_FILE` environment variable takes precedence
    /// over this field when set.
    pub system_prompt: Option<String>,
    /// Fraction of the model's context window that triggers compaction.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f32,
    /// Estimated tokens of recent conversation preserved verbatim through
    /// a compaction.
    #[serde(default = "default_recent_token_budget")]
    pub recent_token_budget: usize,
    /// Hard timeout for the bash tool.  The subprocess is killed when it
    /// expires.
    #[serde(default = "default_bash_timeout")]
    pub bash_timeout_secs: u64,
    /// Byte ceiling for tool output returned to the model.
    #[serde(default = "default_tool_output_limit")]
    pub tool_output_limit: usize,
    /// Restore the session snapshot at startup when one exists.
    #[serde(default = "default_true")]
    pub restore_session: bool,
    /// Snapshot file location.  `None` uses the per-user state directory.
    pub session_file: Option<std::path::PathBuf>,
}

fn default_compaction_threshold() -> f32 {
    0.8
}

fn default_recent_token_budget() -> usize {
    20_000
}

fn default_bash_timeout() -> u64 {
    120
}

fn default_tool_output_limit() -> usize {
    30_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            compaction_threshold: default_compaction_threshold(),
            recent_token_budget: default_recent_token_budget(),
            bash_timeout_secs: default_bash_timeout(),
            tool_output_limit: default_tool_output_limit(),
            restore_session: true,
            session_file: None,
        }
    }
}

/// WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let c = Config::default();
        assert_eq!(c.model.name, "gpt-4o");
        assert_eq!(c.model.api_key_env, "TETHER_API_KEY");
        assert_eq!(c.gateway.port, 8765);
        assert_eq!(c.agent.bash_timeout_secs, 120);
    }

    #[test]
    fn empty_yaml_deserializes_to_defaults() {
        let c: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(c.agent.compaction_threshold, 0.8);
        assert_eq!(c.agent.recent_token_budget, 20_000);
        assert!(c.agent.restore_session);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "model:\n  name: gpt-4o-mini\ngateway:\n  port: 9000\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.model.name, "gpt-4o-mini");
        assert_eq!(c.model.base_url, "https://api.openai.com/v1");
        assert_eq!(c.gateway.port, 9000);
        assert_eq!(c.gateway.host, "127.0.0.1");
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let c = Config::default();
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model.name, c.model.name);
        assert_eq!(back.agent.bash_timeout_secs, c.agent.bash_timeout_secs);
    }
}
