//! quire command-line driver.
//!
//! Runs the client stack against the in-memory backend and prints what the
//! client ends up caching. Useful for poking at refresh and history behavior
//! with `RUST_LOG=quire_client=debug`.
//!
//! Usage:
//!   quire scenario                 # editors, blocks, grant, revoke, history
//!   quire history --restore 2      # scenario, then restore the 2nd oldest write
//!   quire config                   # print the effective client config
//!   quire --config ./client.toml scenario

mod demo;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use quire_client::ClientConfig;

/// Drive a quire client against an in-memory backend.
#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(about = "Exercise the quire client against an in-memory backend")]
struct Args {
    /// Client config file (default: $XDG_CONFIG_HOME/quire/client.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a document, share a block, revoke access, print the result
    Scenario {
        /// Document path to create in the in-memory backend
        #[arg(long, default_value = "/tmp/quire-demo.elf")]
        path: String,
    },
    /// Run the scenario, then print history and restore one write
    History {
        #[arg(long, default_value = "/tmp/quire-demo.elf")]
        path: String,

        /// Which write to restore, counting from the oldest (1-based)
        #[arg(long, default_value_t = 1)]
        restore: usize,
    },
    /// Print the effective client config as TOML
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _telemetry = match quire_telemetry::init_tracing("quire") {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("tracing disabled: {e}");
            None
        }
    };

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    match args.command {
        Command::Scenario { path } => {
            let outcome = demo::run_scenario(config, &path).await?;
            demo::print_state(&outcome)?;
            println!();
            demo::print_history(&outcome)?;
        }
        Command::History { path, restore } => {
            let outcome = demo::run_scenario(config, &path).await?;
            demo::print_history(&outcome)?;
            demo::restore_write(&outcome, restore).await?;
        }
        Command::Config => {
            let text = toml::to_string_pretty(&config).context("failed to render config")?;
            print!("{text}");
        }
    }
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::load_default()?,
    };
    tracing::debug!(?config, "loaded client config");
    Ok(config)
}
