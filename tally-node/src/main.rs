use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tally_node::{ElectionNetwork, NodeConfig};
use tally_storage::FileStore;

#[derive(Parser)]
#[command(author, version, about = "Tally election ledger node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node using the provided configuration file
    Start {
        #[arg(short, long, default_value = "config/node.toml")]
        config: PathBuf,
    },
    /// Generate a default node configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "config/node.toml")]
        path: PathBuf,
    },
    /// Print network status and health as JSON
    Status {
        #[arg(short, long, default_value = "config/node.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config } => start_node(config).await?,
        Commands::GenerateConfig { path } => generate_config(path)?,
        Commands::Status { config } => status(config)?,
    }

    Ok(())
}

fn load_or_default(path: &Path, write_default: bool) -> Result<NodeConfig> {
    if path.exists() {
        return NodeConfig::load(path);
    }
    let config = NodeConfig::default();
    if write_default {
        config.save(path)?;
        info!(?path, "wrote default configuration");
    }
    Ok(config)
}

fn open_network(config: &NodeConfig) -> Result<ElectionNetwork<FileStore>> {
    config.ensure_directories()?;
    let store = Arc::new(FileStore::open(&config.data_dir)?);
    Ok(ElectionNetwork::open(store, config)?)
}

async fn start_node(config_path: PathBuf) -> Result<()> {
    let config = load_or_default(&config_path, true)?;
    let network = open_network(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = network.spawn(shutdown_rx);

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown_tx.send(true)?;

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("background task failed: {}", e);
        }
    }
    Ok(())
}

fn generate_config(path: PathBuf) -> Result<()> {
    let config = NodeConfig::default();
    config.ensure_directories()?;
    config.save(&path)?;
    info!(?path, "wrote default configuration");
    Ok(())
}

fn status(config_path: PathBuf) -> Result<()> {
    let config = load_or_default(&config_path, false)?;
    let network = open_network(&config)?;
    println!("{}", serde_json::to_string_pretty(&network.report())?);
    Ok(())
}
