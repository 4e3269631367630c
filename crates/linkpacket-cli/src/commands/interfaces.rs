//! Interfaces command - list host interfaces

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use linkpacket_core::{Interface, InterfaceFlags};
use linkpacket_platform::interfaces;

/// Interfaces command arguments
#[derive(Args, Debug)]
pub struct InterfacesArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Only interfaces that are up
    #[arg(long)]
    pub up: bool,
}

/// Execute the interfaces command
pub fn execute(args: InterfacesArgs) -> Result<()> {
    let mut list = interfaces().context("Failed to enumerate interfaces")?;
    if args.up {
        list.retain(|ifi| ifi.flags.contains(InterfaceFlags::UP));
    }

    if args.json {
        let json = serde_json::to_string_pretty(&list).context("Failed to serialize interfaces")?;
        println!("{json}");
        return Ok(());
    }

    println!(
        "{}",
        format!("{:>5}  {:<16} {:>6}  {:<20} FLAGS", "INDEX", "NAME", "MTU", "ADDRESS").bold()
    );
    for ifi in &list {
        println!("{}", format_row(ifi));
    }
    Ok(())
}

fn flag_names(flags: InterfaceFlags) -> String {
    let names: Vec<&str> = flags
        .iter_names()
        .map(|(name, _)| name)
        .collect();
    names.join(",").to_lowercase()
}

fn format_row(ifi: &Interface) -> String {
    let addr = ifi
        .hardware_addr
        .map_or_else(|| "-".to_string(), |a| a.to_string());
    format!(
        "{:>5}  {:<16} {:>6}  {:<20} {}",
        ifi.index,
        ifi.name,
        ifi.mtu,
        addr,
        flag_names(ifi.flags)
    )
}
