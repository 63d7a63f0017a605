//! Replication Module
//!
//! Handles log replication between the statically configured leader and
//! its followers. Two independent mechanisms share the replication log:
//! the quorum-gated two-phase commit run for every write, and the
//! periodic reconciler that pushes log suffixes to repair followers.

pub mod protocol;
mod leader;
mod follower;
mod reconciler;

pub use protocol::{Message, FrameHeader, ErrorCode, WriteResult, WriteStatus};
pub use leader::WriteCoordinator;
pub use follower::{handle_prepare, handle_append_entries};
pub use reconciler::LogReconciler;

use std::time::Duration;

/// Configuration for replication
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Reconciliation interval in milliseconds
    pub reconcile_interval_ms: u64,
    /// Timeout for a single follower RPC in milliseconds
    pub rpc_timeout_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 500,
            rpc_timeout_ms: 1000,
        }
    }
}

impl ReplicationConfig {
    /// Get reconciliation interval as Duration
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// Get follower RPC timeout as Duration
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Follower acknowledgements needed to commit in a cluster of
/// `cluster_size` metadata nodes. The leader's own vote is not counted.
pub fn required_acks(cluster_size: usize) -> usize {
    if cluster_size <= 1 {
        0
    } else {
        (cluster_size + 1) / 2
    }
}
