//! Leader Write Path
//!
//! Two-phase commit run by the leader for every accepted write: append the
//! entry locally, ask every follower to prepare it, then apply on quorum
//! or roll the local log back.

use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use tokio::time::timeout;

use crate::metadata::MetadataService;
use crate::oplog::{Command, FileOp, LogEntry};
use crate::replication::{required_acks, ReplicationConfig};
use crate::state::ReplicaState;

/// Coordinates quorum commits from the leader to its followers
pub struct WriteCoordinator {
    /// Follower services, in configuration order
    followers: Vec<Arc<dyn MetadataService>>,
    /// Number of metadata nodes, leader included
    cluster_size: usize,
    /// Timeout for a single prepare call
    rpc_timeout: Duration,
}

impl WriteCoordinator {
    /// Create a coordinator for the given followers
    pub fn new(followers: Vec<Arc<dyn MetadataService>>, config: &ReplicationConfig) -> Self {
        let cluster_size = followers.len() + 1;
        Self {
            followers,
            cluster_size,
            rpc_timeout: config.rpc_timeout(),
        }
    }

    /// Follower services
    pub fn followers(&self) -> &[Arc<dyn MetadataService>] {
        &self.followers
    }

    /// Number of metadata nodes, leader included
    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    /// Commit a single operation.
    ///
    /// The caller holds the node lock across the whole call, so at most one
    /// commit is in flight. Returns `true` when the entry was applied.
    pub async fn commit(&self, state: &mut ReplicaState, command: Command, op: FileOp) -> bool {
        let entry = state.log_mut().append(command, op);

        if self.followers.is_empty() {
            state.apply_pending();
            tracing::debug!("Committed entry #{} on single-node cluster", entry.index);
            return true;
        }

        let acks = self.collect_votes(&entry).await;
        let required = required_acks(self.cluster_size);

        if acks >= required {
            state.apply_pending();
            tracing::info!(
                "Committed entry #{} ({} {} v{}) with {}/{} acks",
                entry.index,
                entry.command,
                entry.op.filename,
                entry.op.version,
                acks,
                self.followers.len()
            );
            true
        } else {
            state.log_mut().truncate(entry.index);
            tracing::warn!(
                "Aborted entry #{} ({} {}): {} acks, {} required",
                entry.index,
                entry.command,
                entry.op.filename,
                acks,
                required
            );
            false
        }
    }

    /// Send prepare to every follower concurrently and count accepts.
    /// Errors and timeouts count as rejections.
    async fn collect_votes(&self, entry: &LogEntry) -> usize {
        let rpc_timeout = self.rpc_timeout;
        let requests = self.followers.iter().map(|follower| {
            let entry = entry.clone();
            async move {
                match timeout(rpc_timeout, follower.prepare(entry)).await {
                    Ok(Ok(accepted)) => accepted,
                    Ok(Err(e)) => {
                        tracing::debug!("Prepare to {} failed: {}", follower.label(), e);
                        false
                    }
                    Err(_) => {
                        tracing::warn!("Prepare to {} timed out", follower.label());
                        false
                    }
                }
            }
        });

        join_all(requests).await.into_iter().filter(|accepted| *accepted).count()
    }
}
