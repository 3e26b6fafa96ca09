//! hashgridd — the HashGrid daemon.
//!
//! Wraps a [`hashgrid_router::Router`] behind a small CLI:
//! - `init` writes a starter `hashgrid.toml`
//! - `check-config` parses and validates a config file
//! - `simulate` replays a recorded membership feed and routes keys
//!
//! # Usage
//!
//! ```text
//! hashgridd init --address hashgrid@10.0.0.1:2552 > hashgrid.toml
//! hashgridd check-config --config hashgrid.toml
//! hashgridd simulate --config hashgrid.toml --events feed.jsonl --key user-1 --key user-2
//! ```

mod simulate;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use hashgrid_core::config::parse_duration;
use hashgrid_core::{HashGridConfig, NodeAddress};

#[derive(Parser)]
#[command(name = "hashgridd", about = "HashGrid consistent-hashing router daemon")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a starter config for a node.
    Init {
        /// Address of the local node, e.g. `hashgrid@10.0.0.1:2552`.
        #[arg(long)]
        address: NodeAddress,
    },

    /// Parse and validate a config file.
    CheckConfig {
        #[arg(long, default_value = "hashgrid.toml")]
        config: PathBuf,
    },

    /// Replay a JSON-lines membership feed, then route keys.
    Simulate {
        #[arg(long, default_value = "hashgrid.toml")]
        config: PathBuf,

        /// One membership event per line.
        #[arg(long)]
        events: PathBuf,

        /// Keys to route once the feed has been applied.
        #[arg(long = "key")]
        keys: Vec<String>,

        /// How long to let the router run after the feed, e.g. "15s".
        #[arg(long, value_parser = parse_settle)]
        settle: Option<Duration>,
    },
}

fn parse_settle(raw: &str) -> Result<Duration, String> {
    parse_duration(raw).ok_or_else(|| format!("invalid duration: {raw}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Init { address } => {
            print!("{}", HashGridConfig::scaffold(address).to_toml_string()?);
            Ok(())
        }
        Command::CheckConfig { config } => check_config(&config),
        Command::Simulate {
            config,
            events,
            keys,
            settle,
        } => {
            let config = load_config(&config)?;
            let script = std::fs::read_to_string(&events)
                .with_context(|| format!("reading membership feed {}", events.display()))?;
            let events = simulate::parse_script(&script)?;

            let report = simulate::run(&config, events, &keys, settle).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hashgrid=debug"));

    // stdout carries the command's output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<HashGridConfig> {
    HashGridConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let policy = config.router.to_policy()?;
    info!(
        node = %config.node.address,
        total_instances = policy.total_instances,
        max_instances_per_node = policy.max_instances_per_node,
        role_filter = ?policy.role_filter,
        grace_ms = policy.unreachable_grace.as_millis() as u64,
        "config ok"
    );
    println!("{}: ok", path.display());
    Ok(())
}
