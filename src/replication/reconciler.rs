//! Log Reconciler
//!
//! Background task on the leader. On every tick it sends each follower
//! the log suffix starting at that follower's cursor and moves the cursor
//! to the length the follower reports back.

use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::error::Error;
use crate::metadata::MetadataService;
use crate::oplog::{LogEntry, LogIndex};
use crate::replication::ReplicationConfig;
use crate::state::ReplicaState;

/// Per-follower replication progress
struct FollowerCursor {
    peer: Arc<dyn MetadataService>,
    /// Next index to send
    next_index: LogIndex,
    /// Whether the last call succeeded
    reachable: bool,
}

/// Periodically pushes the leader's log to every follower
pub struct LogReconciler {
    state: Arc<Mutex<ReplicaState>>,
    followers: Vec<FollowerCursor>,
    interval: Duration,
    rpc_timeout: Duration,
}

impl LogReconciler {
    /// Create a reconciler with every cursor at zero
    pub fn new(
        state: Arc<Mutex<ReplicaState>>,
        followers: Vec<Arc<dyn MetadataService>>,
        config: &ReplicationConfig,
    ) -> Self {
        let followers = followers
            .into_iter()
            .map(|peer| FollowerCursor {
                peer,
                next_index: 0,
                reachable: true,
            })
            .collect();

        Self {
            state,
            followers,
            interval: config.reconcile_interval(),
            rpc_timeout: config.rpc_timeout(),
        }
    }

    /// Cursor of the follower at `position` in configuration order
    pub fn next_index(&self, position: usize) -> Option<LogIndex> {
        self.followers.get(position).map(|f| f.next_index)
    }

    /// Run until the shutdown signal flips to `true`
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        tracing::info!(
            "Log reconciler started for {} followers (every {:?})",
            self.followers.len(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Log reconciler stopped");
    }

    /// One reconciliation round. Returns the number of followers that
    /// answered.
    pub async fn reconcile_once(&mut self) -> usize {
        // Snapshot under the lock, send without it
        let (leader_len, batches) = {
            let state = self.state.lock().await;
            let leader_len = state.log().len();
            let batches: Vec<(LogIndex, Vec<LogEntry>)> = self
                .followers
                .iter()
                .map(|f| {
                    let from = f.next_index.min(leader_len);
                    (from, state.log().entries_from(from))
                })
                .collect();
            (leader_len, batches)
        };

        let rpc_timeout = self.rpc_timeout;
        let calls = self.followers.iter().zip(batches).map(|(f, (from, entries))| {
            let peer = Arc::clone(&f.peer);
            async move {
                match timeout(rpc_timeout, peer.append_entries(from, entries)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::ConnectionTimeout(peer.label().to_string())),
                }
            }
        });
        let results = join_all(calls).await;

        let mut answered = 0;
        for (follower, result) in self.followers.iter_mut().zip(results) {
            match result {
                Ok(length) => {
                    answered += 1;
                    if !follower.reachable {
                        tracing::info!("Follower {} reachable again", follower.peer.label());
                        follower.reachable = true;
                    }
                    if length > leader_len {
                        tracing::debug!(
                            "Follower {} reports length {} past leader length {}",
                            follower.peer.label(),
                            length,
                            leader_len
                        );
                    }
                    follower.next_index = length.min(leader_len);
                }
                Err(e) => {
                    if follower.reachable {
                        tracing::warn!("Follower {} unreachable: {}", follower.peer.label(), e);
                        follower.reachable = false;
                    }
                }
            }
        }

        answered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlockStore;
    use crate::metadata::MetadataNode;
    use crate::oplog::{Command, FileOp};
    use crate::replication::testing::HungFollower;

    fn follower(id: u32) -> Arc<MetadataNode> {
        Arc::new(MetadataNode::follower(id, Arc::new(MemoryBlockStore::new()), 3))
    }

    fn services(nodes: &[Arc<MetadataNode>]) -> Vec<Arc<dyn MetadataService>> {
        nodes
            .iter()
            .map(|n| Arc::clone(n) as Arc<dyn MetadataService>)
            .collect()
    }

    async fn leader_state(count: u64) -> Arc<Mutex<ReplicaState>> {
        let state = Arc::new(Mutex::new(ReplicaState::new()));
        {
            let mut guard = state.lock().await;
            for v in 1..=count {
                guard
                    .log_mut()
                    .append(Command::Write, FileOp::new("a.txt", v, vec![format!("h{}", v)]));
            }
            guard.apply_pending();
        }
        state
    }

    #[tokio::test]
    async fn test_brings_followers_up_to_date() {
        let nodes = vec![follower(2), follower(3)];
        let state = leader_state(3).await;
        let mut reconciler = LogReconciler::new(state, services(&nodes), &ReplicationConfig::default());

        assert_eq!(reconciler.reconcile_once().await, 2);
        assert_eq!(reconciler.next_index(0), Some(3));
        assert_eq!(reconciler.next_index(1), Some(3));

        for node in &nodes {
            assert_eq!(node.get_version("a.txt").await.unwrap(), 3);
        }
    }

    #[tokio::test]
    async fn test_crashed_follower_keeps_cursor() {
        let nodes = vec![follower(2), follower(3)];
        nodes[1].crash().await.unwrap();
        let state = leader_state(2).await;
        let mut reconciler = LogReconciler::new(state, services(&nodes), &ReplicationConfig::default());

        assert_eq!(reconciler.reconcile_once().await, 1);
        assert_eq!(reconciler.next_index(0), Some(2));
        assert_eq!(reconciler.next_index(1), Some(0));

        nodes[1].restore().await.unwrap();
        assert_eq!(reconciler.reconcile_once().await, 2);
        assert_eq!(reconciler.next_index(1), Some(2));
        assert_eq!(nodes[1].get_version("a.txt").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cursor_clamped_to_leader_length() {
        let nodes = vec![follower(2)];
        let ahead = leader_state(2).await;
        let entries = ahead.lock().await.log().entries_from(0);
        nodes[0].append_entries(0, entries).await.unwrap();

        // Fresh leader with an empty log
        let state = leader_state(0).await;
        let mut reconciler = LogReconciler::new(state, services(&nodes), &ReplicationConfig::default());

        assert_eq!(reconciler.reconcile_once().await, 1);
        assert_eq!(reconciler.next_index(0), Some(0));

        // Applied entries are never trimmed
        assert_eq!(nodes[0].get_version("a.txt").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_drops_rolled_back_prepare() {
        let nodes = vec![follower(2)];
        let state = leader_state(1).await;
        let committed = state.lock().await.log().entries_from(0);
        nodes[0].append_entries(0, committed.clone()).await.unwrap();

        // Prepare the leader later rolled back
        let mut scratch = crate::oplog::ReplicationLog::new();
        for entry in committed {
            scratch.push(entry);
        }
        let extra = scratch.append(Command::Write, FileOp::new("b.txt", 1, vec!["x".into()]));
        assert!(nodes[0].prepare(extra).await.unwrap());

        let mut reconciler = LogReconciler::new(state, services(&nodes), &ReplicationConfig::default());
        reconciler.reconcile_once().await;
        reconciler.reconcile_once().await;

        assert_eq!(reconciler.next_index(0), Some(1));
        let follower_state = nodes[0].state();
        assert_eq!(follower_state.lock().await.log().len(), 1);
        assert_eq!(nodes[0].get_version("b.txt").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let nodes = vec![follower(2)];
        let state = leader_state(1).await;
        let config = ReplicationConfig {
            reconcile_interval_ms: 10,
            rpc_timeout_ms: 100,
        };
        let reconciler = LogReconciler::new(state, services(&nodes), &config);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(reconciler.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(nodes[0].get_version("a.txt").await.unwrap(), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_hung_follower_times_out() {
        let nodes = vec![follower(2)];
        let mut peers = services(&nodes);
        peers.push(Arc::new(HungFollower));
        let state = leader_state(2).await;
        let config = ReplicationConfig {
            reconcile_interval_ms: 10,
            rpc_timeout_ms: 100,
        };
        let mut reconciler = LogReconciler::new(state, peers, &config);

        let started = std::time::Instant::now();
        assert_eq!(reconciler.reconcile_once().await, 1);
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(reconciler.next_index(0), Some(2));
        assert_eq!(reconciler.next_index(1), Some(0));
        assert_eq!(nodes[0].get_version("a.txt").await.unwrap(), 2);
    }
}
