//! CLI commands

pub mod completions;
pub mod config;
pub mod filter;
pub mod interfaces;
pub mod listen;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use linkpacket_core::Config;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive frames on an interface and print them
    Listen(listen::ListenArgs),

    /// List network interfaces
    Interfaces(interfaces::InterfacesArgs),

    /// Print the filter program a connection would install
    Filter(filter::FilterArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Load the `--config` file, or the defaults when none was given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}
