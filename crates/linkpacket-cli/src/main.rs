//! linkpacket CLI
//!
//! Listen on link-layer connections, list interfaces and inspect filters.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;
use commands::Command;

fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args)?;

    let result = run(args);

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Listen(listen_args) => commands::listen::execute(listen_args, args.config),
        Command::Interfaces(iface_args) => commands::interfaces::execute(iface_args),
        Command::Filter(filter_args) => commands::filter::execute(filter_args, args.config),
        Command::Config(config_args) => commands::config::execute(config_args),
        Command::Completions(comp_args) => commands::completions::execute(comp_args),
    }
}
