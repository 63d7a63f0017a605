//! Metadata Module
//!
//! Metadata nodes track, for every filename, its version and ordered block
//! list. The [`MetadataService`] trait is the full RPC surface of a node;
//! it is implemented in-process by [`MetadataNode`] and over the network
//! by [`MetadataClient`].

mod node;
mod client;
mod handler;

pub use node::{MetadataNode, NodeStatus};
pub use client::MetadataClient;
pub use handler::{handle_metadata_message, metadata_handler};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::oplog::{LogEntry, LogIndex, Version};
use crate::replication::WriteResult;

/// Role of a metadata node, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Accepts writes and drives replication
    Leader,
    /// Receives the leader's log
    Follower,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "LEADER"),
            NodeRole::Follower => write!(f, "FOLLOWER"),
        }
    }
}

/// RPC surface of a metadata node
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Name used in log lines
    fn label(&self) -> &str;

    /// Liveness check
    async fn ping(&self) -> Result<()>;

    /// Version and block list of a file. Fails while crashed.
    async fn read_file(&self, filename: &str) -> Result<(Version, Vec<String>)>;

    /// Version of a file. Answered even while crashed.
    async fn get_version(&self, filename: &str) -> Result<Version>;

    /// Create or replace a file at `version`
    async fn modify_file(
        &self,
        filename: &str,
        version: Version,
        block_hashes: Vec<String>,
    ) -> Result<WriteResult>;

    /// Delete a file at `version`
    async fn delete_file(&self, filename: &str, version: Version) -> Result<WriteResult>;

    /// Two-phase commit vote
    async fn prepare(&self, entry: LogEntry) -> Result<bool>;

    /// Install a log suffix, returning the resulting log length
    async fn append_entries(&self, from_index: LogIndex, entries: Vec<LogEntry>) -> Result<u64>;

    async fn is_leader(&self) -> Result<bool>;

    async fn crash(&self) -> Result<()>;

    async fn restore(&self) -> Result<()>;

    async fn is_crashed(&self) -> Result<bool>;
}
