mod call;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use duet_core::IceServerConfig;
use duet_core::utils::default_ice_servers;
use duet_server::RelayConfig;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "duet", version, about = "One-to-one calls over a tiny signaling relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay and room directory.
    Relay {
        #[arg(long, env = "DUET_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// STUN/TURN urls pushed to clients. Repeatable.
        #[arg(long = "stun", env = "DUET_STUN", value_delimiter = ',')]
        stun: Vec<String>,
    },

    /// Join a call as a headless participant with synthetic media.
    Call(call::CallArgs),
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn ice_servers_from(urls: Vec<String>) -> Vec<IceServerConfig> {
    if urls.is_empty() {
        return default_ice_servers();
    }
    vec![IceServerConfig {
        urls,
        username: None,
        credential: None,
    }]
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        Commands::Relay { bind, stun } => {
            println!("{}", "Starting duet relay...".green().bold());
            println!("   ws://{}/ws/{{peer_id}}", bind);

            let config = RelayConfig {
                bind,
                ice_servers: ice_servers_from(stun),
            };
            tokio::select! {
                res = duet_server::serve(config) => res.context("Relay stopped")?,
                _ = tokio::signal::ctrl_c() => {
                    println!("{}", "Relay shutting down".yellow());
                }
            }
        }
        Commands::Call(args) => call::run(args).await?,
    }

    Ok(())
}
