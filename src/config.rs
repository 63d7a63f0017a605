//! WolfSync Configuration
//!
//! This module provides configuration structures for a WolfSync cluster.
//! The same file is read by every metadata node, the block store and the
//! command line client.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::replication::ReplicationConfig;

/// Main WolfSync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfSyncConfig {
    /// Metadata cluster configuration
    pub cluster: ClusterConfig,

    /// Block store configuration
    pub block: BlockConfig,

    /// Client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// ID of the leader node
    pub leader: u32,

    /// Log reconciliation interval in milliseconds
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,

    /// Timeout for a single RPC in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Metadata nodes, ids 1..=N
    #[serde(default)]
    pub metadata: Vec<MetadataNodeConfig>,
}

/// A single metadata node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataNodeConfig {
    /// Node ID (1-based)
    pub id: u32,

    /// Address for node and client traffic
    pub address: String,

    /// HTTP status API bind address (optional)
    #[serde(default)]
    pub api_address: Option<String>,
}

/// Block store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Block store address
    pub address: String,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum write attempts before giving up on OLD_VERSION
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_reconcile_interval_ms() -> u64 {
    500
}

fn default_rpc_timeout_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfSyncConfig {
    /// Load configuration from a file.
    ///
    /// Files ending in `.toml` are parsed as TOML; anything else is read
    /// in the line-based `M: 3` / `L: 1` / `metadata1: 9001` format.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            Self::from_str(&content)
        } else {
            Self::from_legacy_str(&content)
        }
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfSyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the line-based format.
    ///
    /// Unrecognized lines are skipped with a warning. Ports are bound on
    /// the loopback interface.
    pub fn from_legacy_str(content: &str) -> crate::Result<Self> {
        let mut num_metadata: Option<u32> = None;
        let mut leader: Option<u32> = None;
        let mut block_port: Option<u16> = None;
        let mut metadata_ports: HashMap<u32, u16> = HashMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once([':', '=']) else {
                tracing::warn!("Skipping invalid config line: {}", line);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            let parsed = match key {
                "M" => value.parse::<u32>().map(|n| num_metadata = Some(n)).is_ok(),
                "L" => value.parse::<u32>().map(|n| leader = Some(n)).is_ok(),
                "block" => value.parse::<u16>().map(|p| block_port = Some(p)).is_ok(),
                _ => match key.strip_prefix("metadata").map(str::parse::<u32>) {
                    Some(Ok(id)) => value
                        .parse::<u16>()
                        .map(|port| {
                            metadata_ports.insert(id, port);
                        })
                        .is_ok(),
                    _ => false,
                },
            };

            if !parsed {
                tracing::warn!("Skipping invalid config line: {}", line);
            }
        }

        let (Some(num_metadata), Some(leader), Some(block_port)) = (num_metadata, leader, block_port) else {
            return Err(crate::Error::Config(
                "config is missing one or more of M, L and block".into(),
            ));
        };

        let mut metadata = Vec::with_capacity(num_metadata as usize);
        for id in 1..=num_metadata {
            let port = metadata_ports
                .get(&id)
                .ok_or_else(|| crate::Error::Config(format!("must set port for metadata{}", id)))?;
            metadata.push(MetadataNodeConfig {
                id,
                address: format!("127.0.0.1:{}", port),
                api_address: None,
            });
        }

        let config = WolfSyncConfig {
            cluster: ClusterConfig {
                leader,
                reconcile_interval_ms: default_reconcile_interval_ms(),
                rpc_timeout_ms: default_rpc_timeout_ms(),
                connect_timeout_ms: default_connect_timeout_ms(),
                metadata,
            },
            block: BlockConfig {
                address: format!("127.0.0.1:{}", block_port),
            },
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Example configuration for a local cluster of `nodes` metadata servers
    pub fn example(nodes: u32) -> Self {
        let metadata = (1..=nodes.max(1))
            .map(|id| MetadataNodeConfig {
                id,
                address: format!("127.0.0.1:{}", 9000 + id),
                api_address: Some(format!("127.0.0.1:{}", 8080 + id)),
            })
            .collect();

        WolfSyncConfig {
            cluster: ClusterConfig {
                leader: 1,
                reconcile_interval_ms: default_reconcile_interval_ms(),
                rpc_timeout_ms: default_rpc_timeout_ms(),
                connect_timeout_ms: default_connect_timeout_ms(),
                metadata,
            },
            block: BlockConfig {
                address: "127.0.0.1:9000".to_string(),
            },
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.cluster.metadata.is_empty() {
            return Err(crate::Error::Config("at least one metadata node is required".into()));
        }

        let mut ids: Vec<u32> = self.cluster.metadata.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        let contiguous = ids.iter().enumerate().all(|(i, id)| *id == i as u32 + 1);
        if !contiguous {
            return Err(crate::Error::Config(
                "metadata ids must be unique and numbered 1..=N".into(),
            ));
        }

        if self.metadata_node(self.cluster.leader).is_none() {
            return Err(crate::Error::Config(format!(
                "leader {} is not a configured metadata node",
                self.cluster.leader
            )));
        }

        if let Some(node) = self.cluster.metadata.iter().find(|m| m.address.is_empty()) {
            return Err(crate::Error::Config(format!("metadata{} address cannot be empty", node.id)));
        }

        if self.block.address.is_empty() {
            return Err(crate::Error::Config("block.address cannot be empty".into()));
        }

        if self.cluster.reconcile_interval_ms == 0
            || self.cluster.rpc_timeout_ms == 0
            || self.cluster.connect_timeout_ms == 0
        {
            return Err(crate::Error::Config("cluster intervals must be non-zero".into()));
        }

        if self.client.max_retries == 0 {
            return Err(crate::Error::Config("client.max_retries must be at least 1".into()));
        }

        Ok(())
    }

    /// Number of metadata nodes
    pub fn num_metadata(&self) -> usize {
        self.cluster.metadata.len()
    }

    /// Look up a metadata node by ID
    pub fn metadata_node(&self, id: u32) -> Option<&MetadataNodeConfig> {
        self.cluster.metadata.iter().find(|m| m.id == id)
    }

    /// The leader's node configuration
    pub fn leader_node(&self) -> crate::Result<&MetadataNodeConfig> {
        self.metadata_node(self.cluster.leader)
            .ok_or_else(|| crate::Error::Config(format!("no metadata{} configured", self.cluster.leader)))
    }

    /// Every node except `id`, in ID order
    pub fn peers_of(&self, id: u32) -> Vec<&MetadataNodeConfig> {
        let mut peers: Vec<_> = self.cluster.metadata.iter().filter(|m| m.id != id).collect();
        peers.sort_by_key(|m| m.id);
        peers
    }

    /// Replication settings for the leader
    pub fn replication(&self) -> ReplicationConfig {
        ReplicationConfig {
            reconcile_interval_ms: self.cluster.reconcile_interval_ms,
            rpc_timeout_ms: self.cluster.rpc_timeout_ms,
        }
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.connect_timeout_ms)
    }

    /// Get RPC timeout as Duration
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.rpc_timeout_ms)
    }
}
