//! WolfSyncCtl - Command line client for WolfSync clusters
//!
//! Usage:
//!   wolfsyncctl upload <path>            - Upload a local file
//!   wolfsyncctl download <name> <dir>    - Download a file into a directory
//!   wolfsyncctl delete <name>            - Delete a file
//!   wolfsyncctl getversion <name>        - Print a file's version
//!   wolfsyncctl crash -n <N>             - Crash a metadata node
//!   wolfsyncctl restore -n <N>           - Restore a crashed node
//!   wolfsyncctl status                   - Show every node's status

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use wolfsync::client::SyncClient;
use wolfsync::config::WolfSyncConfig;
use wolfsync::metadata::{MetadataClient, MetadataService, NodeStatus};
use wolfsync::network::NetworkClient;

/// WolfSync Client and Control Tool
#[derive(Parser)]
#[command(name = "wolfsyncctl")]
#[command(about = "Sync files with a WolfSync cluster", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wolfsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Upload {
        /// Path of the file to upload
        path: PathBuf,
    },
    /// Download a file into a directory
    Download {
        /// Name of the file
        filename: String,
        /// Directory to write into
        dir: PathBuf,
    },
    /// Delete a file
    Delete {
        /// Name of the file
        filename: String,
    },
    /// Print the version of a file
    #[command(name = "getversion")]
    GetVersion {
        /// Name of the file
        filename: String,
    },
    /// Crash a metadata node
    Crash {
        #[arg(short = 'n', long)]
        number: u32,
    },
    /// Restore a crashed metadata node
    Restore {
        #[arg(short = 'n', long)]
        number: u32,
    },
    /// Ask whether a metadata node is crashed
    IsCrashed {
        #[arg(short = 'n', long)]
        number: u32,
    },
    /// Ask whether a metadata node is the leader
    IsLeader {
        #[arg(short = 'n', long)]
        number: u32,
    },
    /// Show the status of every metadata node with an HTTP API
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = WolfSyncConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {:?}", cli.config))?;

    match cli.command {
        Commands::Upload { path } => {
            let outcome = SyncClient::connect(&config)?.upload(&path).await?;
            println!("{}", outcome);
        }
        Commands::Download { filename, dir } => {
            let outcome = SyncClient::connect(&config)?.download(&filename, &dir).await?;
            println!("{}", outcome);
        }
        Commands::Delete { filename } => {
            let outcome = SyncClient::connect(&config)?.delete(&filename).await?;
            println!("{}", outcome);
        }
        Commands::GetVersion { filename } => {
            let version = SyncClient::connect(&config)?.get_version(&filename).await?;
            println!("{}", version);
        }
        Commands::Crash { number } => {
            node(&config, number)?.crash().await?;
            println!("OK");
        }
        Commands::Restore { number } => {
            node(&config, number)?.restore().await?;
            println!("OK");
        }
        Commands::IsCrashed { number } => {
            println!("{}", node(&config, number)?.is_crashed().await?);
        }
        Commands::IsLeader { number } => {
            println!("{}", node(&config, number)?.is_leader().await?);
        }
        Commands::Status => show_status(&config).await?,
    }

    Ok(())
}

/// Control connection to one metadata node
fn node(config: &WolfSyncConfig, number: u32) -> anyhow::Result<MetadataClient> {
    let Some(node) = config.metadata_node(number) else {
        bail!("metadata{} is not configured", number);
    };
    let network = Arc::new(NetworkClient::new(config.connect_timeout(), config.rpc_timeout()));
    Ok(MetadataClient::new(&node.address, network))
}

async fn show_status(config: &WolfSyncConfig) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(config.rpc_timeout())
        .build()?;

    println!();
    println!("WolfSync Cluster Status (wolfsyncctl v{})", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!();
    println!("{:<12} {:<10} {:<10} {:<8} {:<8} {:<8}",
        "NODE", "ROLE", "STATE", "LOG", "APPLIED", "FILES");
    println!("{}", "-".repeat(60));

    for node in &config.cluster.metadata {
        let name = format!("metadata{}", node.id);
        let Some(api) = &node.api_address else {
            println!("{:<12} (no api_address configured)", name);
            continue;
        };

        let status = match http.get(format!("http://{}/status", api)).send().await {
            Ok(response) if response.status().is_success() => response.json::<NodeStatus>().await.ok(),
            _ => None,
        };

        match status {
            Some(status) => {
                // Pad before adding color codes
                let state_padded = format!("{:<10}", if status.crashed { "CRASHED" } else { "UP" });
                let state_colored = if status.crashed {
                    format!("\x1b[31m{}\x1b[0m", state_padded)
                } else {
                    format!("\x1b[32m{}\x1b[0m", state_padded)
                };
                let applied = status
                    .last_applied
                    .map(|i| (i + 1).to_string())
                    .unwrap_or_else(|| "0".to_string());

                println!("{:<12} {:<10} {} {:<8} {:<8} {:<8}",
                    name,
                    status.role.to_string(),
                    state_colored,
                    status.log_length,
                    applied,
                    status.file_count
                );
            }
            None => {
                println!("{:<12} {:<10} \x1b[31m{:<10}\x1b[0m", name, "?", "OFFLINE");
            }
        }
    }
    println!();

    Ok(())
}
