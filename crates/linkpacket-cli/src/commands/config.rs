//! Config command - configuration management

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use colored::Colorize;
use linkpacket_core::Config;
use tracing::info;

/// Config command arguments
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("action").required(true).args(["default", "validate"])))]
pub struct ConfigArgs {
    /// Print the default configuration as TOML
    #[arg(long)]
    pub default: bool,

    /// Validate a configuration file
    #[arg(long, value_name = "FILE")]
    pub validate: Option<PathBuf>,
}

/// Execute config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    match args.validate {
        Some(file) => validate_config(file),
        None => show_default(),
    }
}

fn show_default() -> Result<()> {
    let toml_str = Config::default()
        .to_toml()
        .context("Failed to serialize config")?;

    println!("# linkpacket configuration");
    println!("# direction = \"in\" | \"out\" | \"in-out\"");
    println!("# [[filter]] entries are classic BPF instructions: op, jt, jf, k");
    println!();
    print!("{toml_str}");
    Ok(())
}

fn validate_config(file: PathBuf) -> Result<()> {
    let config = Config::load(&file)
        .with_context(|| format!("Failed to load config from {}", file.display()))?;

    info!(path = %file.display(), "Configuration is valid");
    println!("{} {}", "✓".green(), "Configuration is valid".green().bold());
    println!("  Direction:    {}", config.direction);
    println!("  Filter:       {} instruction(s)", config.filter.len());
    Ok(())
}
