// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use tether_core::Agent;
use tether_model::catalog;
use tether_tools::{BashTool, EditTool, ReadTool, SearchWebTool, ToolRegistry, WriteTool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::ListModels { json }) => return list_models_cmd(*json),
        Some(Commands::ShowConfig) => {
            let config = tether_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            return Ok(());
        }
        None => {}
    }

    let mut config = tether_config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(model) = cli.model {
        config.model.name = model;
    }
    let config = Arc::new(config);

    let mut registry = ToolRegistry::new();
    registry.register(BashTool {
        timeout_secs: config.agent.bash_timeout_secs,
        output_limit: config.agent.tool_output_limit,
    });
    registry.register(ReadTool);
    registry.register(WriteTool);
    registry.register(EditTool);
    registry.register(SearchWebTool);

    let agent = Arc::new(Agent::new(Arc::clone(&config), Arc::new(registry)));
    tether_gateway::run(config, agent).await
}

/// Print the static model catalog.
fn list_models_cmd(as_json: bool) -> anyhow::Result<()> {
    let entries = catalog::static_catalog();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let id_w = entries.iter().map(|e| e.id.len()).max().unwrap_or(10).max(10);
    println!(
        "{:<id_w$}  {:>12}  {:>16}  DESCRIPTION",
        "ID",
        "CTX WINDOW",
        "MAX OUT TOKENS",
        id_w = id_w,
    );
    println!("{}", "-".repeat(id_w + 50));
    for e in &entries {
        println!(
            "{:<id_w$}  {:>12}  {:>16}  {}",
            e.id,
            e.context_window,
            e.max_output_tokens,
            e.description,
            id_w = id_w,
        );
    }
    println!("\nTotal: {} model(s)", entries.len());
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
