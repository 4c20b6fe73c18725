// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tether",
    version,
    about = "Multi-client gateway for a streaming AI coding agent"
)]
pub struct Cli {
    /// Path to the YAML config file (default: ~/.config/tether/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen host override
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port override
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Model id override
    #[arg(short, long)]
    pub model: Option<String>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the models in the bundled catalog
    ListModels {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as YAML
    ShowConfig,
}
