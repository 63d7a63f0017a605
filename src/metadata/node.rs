//! Metadata Node
//!
//! One metadata server: its replica state behind a single lock, its
//! static role, and the crash flag used for fault injection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{MetadataService, NodeRole};
use crate::block::BlockStore;
use crate::error::{Error, Result};
use crate::oplog::{Command, FileOp, LogEntry, LogIndex, Version};
use crate::replication::{
    handle_append_entries, handle_prepare, LogReconciler, ReplicationConfig, WriteCoordinator,
    WriteResult,
};
use crate::state::{FileRecord, ReplicaState};

/// Point-in-time view of a node, served by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: u32,
    pub role: NodeRole,
    pub crashed: bool,
    pub log_length: u64,
    pub last_applied: Option<LogIndex>,
    pub file_count: usize,
    pub cluster_size: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

/// A metadata server
pub struct MetadataNode {
    /// Node ID (1-based, as configured)
    id: u32,
    label: String,
    role: NodeRole,
    crashed: AtomicBool,
    /// Log, store and apply cursor
    state: Arc<Mutex<ReplicaState>>,
    block_store: Arc<dyn BlockStore>,
    /// Present on the leader only
    coordinator: Option<WriteCoordinator>,
    replication: ReplicationConfig,
    cluster_size: usize,
    started_at: DateTime<Utc>,
}

impl MetadataNode {
    /// Create the leader, wired to its followers
    pub fn leader(
        id: u32,
        block_store: Arc<dyn BlockStore>,
        followers: Vec<Arc<dyn MetadataService>>,
        replication: ReplicationConfig,
    ) -> Self {
        let coordinator = WriteCoordinator::new(followers, &replication);
        let cluster_size = coordinator.cluster_size();
        Self::build(id, NodeRole::Leader, block_store, Some(coordinator), replication, cluster_size)
    }

    /// Create a follower in a cluster of `cluster_size` metadata nodes
    pub fn follower(id: u32, block_store: Arc<dyn BlockStore>, cluster_size: usize) -> Self {
        Self::build(
            id,
            NodeRole::Follower,
            block_store,
            None,
            ReplicationConfig::default(),
            cluster_size,
        )
    }

    fn build(
        id: u32,
        role: NodeRole,
        block_store: Arc<dyn BlockStore>,
        coordinator: Option<WriteCoordinator>,
        replication: ReplicationConfig,
        cluster_size: usize,
    ) -> Self {
        Self {
            id,
            label: format!("metadata{}", id),
            role,
            crashed: AtomicBool::new(false),
            state: Arc::new(Mutex::new(ReplicaState::new())),
            block_store,
            coordinator,
            replication,
            cluster_size,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Current crash flag
    pub fn crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Shared handle to the replica state
    pub fn state(&self) -> Arc<Mutex<ReplicaState>> {
        Arc::clone(&self.state)
    }

    /// Number of metadata nodes this node knows about
    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    /// Build the background reconciler. `None` on followers.
    pub fn reconciler(&self) -> Option<LogReconciler> {
        let coordinator = self.coordinator.as_ref()?;
        Some(LogReconciler::new(
            self.state(),
            coordinator.followers().to_vec(),
            &self.replication,
        ))
    }

    /// Committed record of a file, tombstones included
    pub async fn file_record(&self, filename: &str) -> Option<FileRecord> {
        self.state.lock().await.store().get(filename).cloned()
    }

    /// Status snapshot
    pub async fn status(&self) -> NodeStatus {
        let state = self.state.lock().await;
        let now = Utc::now();
        NodeStatus {
            id: self.id,
            role: self.role,
            crashed: self.crashed(),
            log_length: state.log().len(),
            last_applied: state.last_applied(),
            file_count: state.store().len(),
            cluster_size: self.cluster_size(),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds(),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.crashed() {
            return Err(Error::NodeCrashed);
        }
        Ok(())
    }

    /// Hashes the block store does not have, deduplicated, in request order
    async fn missing_blocks(&self, block_hashes: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for hash in block_hashes {
            if !seen.insert(hash.as_str()) {
                continue;
            }
            if !self.block_store.has_block(hash).await? {
                missing.push(hash.clone());
            }
        }
        Ok(missing)
    }
}

#[async_trait]
impl MetadataService for MetadataNode {
    fn label(&self) -> &str {
        &self.label
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn read_file(&self, filename: &str) -> Result<(Version, Vec<String>)> {
        self.ensure_running()?;
        Ok(self.state.lock().await.store().read(filename))
    }

    async fn get_version(&self, filename: &str) -> Result<Version> {
        Ok(self.state.lock().await.version(filename))
    }

    async fn modify_file(
        &self,
        filename: &str,
        version: Version,
        block_hashes: Vec<String>,
    ) -> Result<WriteResult> {
        self.ensure_running()?;
        let Some(coordinator) = &self.coordinator else {
            return Ok(WriteResult::not_leader());
        };

        let mut state = self.state.lock().await;
        let current = state.version(filename);
        if version != current + 1 {
            tracing::debug!("Write {} v{} rejected: current version {}", filename, version, current);
            return Ok(WriteResult::old_version(current));
        }

        let missing = self.missing_blocks(&block_hashes).await?;
        if !missing.is_empty() {
            tracing::debug!("Write {} v{} missing {} blocks", filename, version, missing.len());
            return Ok(WriteResult::missing_blocks(current, missing));
        }

        let op = FileOp::new(filename, version, block_hashes);
        if coordinator.commit(&mut state, Command::Write, op).await {
            Ok(WriteResult::ok(version))
        } else {
            Ok(WriteResult::abort(current))
        }
    }

    async fn delete_file(&self, filename: &str, version: Version) -> Result<WriteResult> {
        self.ensure_running()?;
        let Some(coordinator) = &self.coordinator else {
            return Ok(WriteResult::not_leader());
        };

        let mut state = self.state.lock().await;
        let current = state.version(filename);
        if current == 0 || version != current + 1 {
            tracing::debug!("Delete {} v{} rejected: current version {}", filename, version, current);
            return Ok(WriteResult::old_version(current));
        }

        let op = FileOp::new(filename, version, Vec::new());
        if coordinator.commit(&mut state, Command::Delete, op).await {
            Ok(WriteResult::ok(version))
        } else {
            Ok(WriteResult::abort(current))
        }
    }

    async fn prepare(&self, entry: LogEntry) -> Result<bool> {
        if self.crashed() {
            tracing::debug!("Crashed, rejecting prepare for entry #{}", entry.index);
            return Ok(false);
        }
        if self.role == NodeRole::Leader {
            tracing::warn!("Leader received prepare for entry #{}", entry.index);
            return Ok(false);
        }

        let mut state = self.state.lock().await;
        Ok(handle_prepare(&mut state, entry))
    }

    async fn append_entries(&self, from_index: LogIndex, entries: Vec<LogEntry>) -> Result<u64> {
        self.ensure_running()?;
        let mut state = self.state.lock().await;
        if self.role == NodeRole::Leader {
            tracing::warn!("Leader received append entries from index {}", from_index);
            return Ok(state.log().len());
        }
        Ok(handle_append_entries(&mut state, from_index, entries))
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(self.role == NodeRole::Leader)
    }

    async fn crash(&self) -> Result<()> {
        if !self.crashed.swap(true, Ordering::SeqCst) {
            tracing::warn!("Node {} crashed", self.id);
        }
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        if self.crashed.swap(false, Ordering::SeqCst) {
            tracing::info!("Node {} restored", self.id);
        }
        Ok(())
    }

    async fn is_crashed(&self) -> Result<bool> {
        Ok(self.crashed())
    }
}
