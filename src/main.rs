//! WolfSync - Distributed File Sync Metadata Service
//!
//! Runs a metadata node or the block store of a WolfSync cluster.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfsync::api::HttpServer;
use wolfsync::block::{block_handler, BlockClient, BlockStore, MemoryBlockStore};
use wolfsync::config::{LoggingConfig, WolfSyncConfig};
use wolfsync::error::{Error, Result};
use wolfsync::metadata::{metadata_handler, MetadataClient, MetadataNode, MetadataService};
use wolfsync::network::{NetworkClient, NetworkServer};

/// Idle pooled connections older than this are dropped
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// WolfSync - Distributed File Sync Metadata Service
#[derive(Parser)]
#[command(name = "wolfsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (.toml, or the line-based format)
    #[arg(short, long, default_value = "wolfsync.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a metadata node
    Metadata {
        /// Metadata node number (1..=N)
        #[arg(short = 'n', long)]
        number: u32,
    },

    /// Run the block store
    Block,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfsync.toml")]
        output: PathBuf,

        /// Number of metadata nodes
        #[arg(long, default_value_t = 3)]
        nodes: u32,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let logging = WolfSyncConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(cli.log_level.as_deref(), &logging);

    match cli.command {
        Commands::Metadata { number } => run_metadata(cli.config, number).await,
        Commands::Block => run_block(cli.config).await,
        Commands::Init { output, nodes } => run_init(output, nodes),
        Commands::Validate => run_validate(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: Option<&str>, logging: &LoggingConfig) {
    let level = level.unwrap_or(&logging.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(config_path: &Path) -> Result<WolfSyncConfig> {
    match WolfSyncConfig::from_file(config_path) {
        Ok(c) => Ok(c),
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            Err(e)
        }
    }
}

/// Run a metadata node
async fn run_metadata(config_path: PathBuf, number: u32) -> Result<()> {
    let config = load_config(&config_path)?;
    let node_config = config
        .metadata_node(number)
        .cloned()
        .ok_or_else(|| Error::Config(format!("metadata{} is not configured", number)))?;

    let network = Arc::new(NetworkClient::new(config.connect_timeout(), config.rpc_timeout()));
    let block_client = BlockClient::new(&config.block.address, Arc::clone(&network));
    if let Err(e) = block_client.ping().await {
        tracing::warn!("Block store {} not reachable yet: {}", config.block.address, e);
    }
    let blocks: Arc<dyn BlockStore> = Arc::new(block_client);

    let node = if number == config.cluster.leader {
        let followers: Vec<Arc<dyn MetadataService>> = config
            .peers_of(number)
            .into_iter()
            .map(|peer| {
                Arc::new(MetadataClient::new(&peer.address, Arc::clone(&network))) as Arc<dyn MetadataService>
            })
            .collect();
        tracing::info!(
            "Starting metadata{} as LEADER with {} followers",
            number,
            followers.len()
        );
        Arc::new(MetadataNode::leader(number, blocks, followers, config.replication()))
    } else {
        tracing::info!(
            "Starting metadata{} as FOLLOWER (leader is metadata{})",
            number,
            config.cluster.leader
        );
        Arc::new(MetadataNode::follower(number, blocks, config.num_metadata()))
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup_handle = tokio::spawn(cleanup_pool(Arc::clone(&network), shutdown_rx.clone()));
    let reconciler_handle = node.reconciler().map(|r| tokio::spawn(r.run(shutdown_rx)));

    let http_handle = node_config.api_address.clone().map(|address| {
        let http_server = HttpServer::new(address, Arc::clone(&node));
        tokio::spawn(async move {
            if let Err(e) = http_server.start().await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    });

    let network_server = NetworkServer::new(node_config.address.clone(), metadata_handler(Arc::clone(&node)));

    tokio::select! {
        result = network_server.start() => {
            if let Err(e) = result {
                tracing::error!("Network server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Cleanup
    let _ = shutdown_tx.send(true);
    if let Some(handle) = reconciler_handle {
        let _ = handle.await;
    }
    let _ = cleanup_handle.await;
    if let Some(handle) = http_handle {
        handle.abort();
    }
    network.close_all().await;

    tracing::info!("metadata{} shutdown complete", number);
    Ok(())
}

/// Periodically drop idle pooled connections until shutdown
async fn cleanup_pool(network: Arc<NetworkClient>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(POOL_IDLE_TIMEOUT);
    loop {
        tokio::select! {
            _ = ticker.tick() => network.cleanup_stale(POOL_IDLE_TIMEOUT).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Run the block store
async fn run_block(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    tracing::info!("Starting block store on {}", config.block.address);

    let store: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
    let server = NetworkServer::new(config.block.address.clone(), block_handler(store));

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                tracing::error!("Network server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    tracing::info!("Block store shutdown complete");
    Ok(())
}

/// Write an example configuration file
fn run_init(output: PathBuf, nodes: u32) -> Result<()> {
    if output.exists() {
        return Err(Error::Config(format!("{:?} already exists", output)));
    }

    let content = format!(
        "# WolfSync Configuration\n# Generated configuration file\n\n{}",
        WolfSyncConfig::example(nodes).to_toml()?
    );
    std::fs::write(&output, content)?;

    println!("Configuration written to {:?}", output);
    println!("Start the block store:   wolfsync -c {:?} block", output);
    println!("Start each node:         wolfsync -c {:?} metadata -n <N>", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;

    println!("Configuration is valid");
    println!("  Metadata nodes: {}", config.num_metadata());
    println!("  Leader:         metadata{}", config.cluster.leader);
    for node in &config.cluster.metadata {
        match &node.api_address {
            Some(api) => println!("    metadata{}: {} (api {})", node.id, node.address, api),
            None => println!("    metadata{}: {}", node.id, node.address),
        }
    }
    println!("  Block store:    {}", config.block.address);
    println!("  Reconcile:      every {} ms", config.cluster.reconcile_interval_ms);
    Ok(())
}
