//! Replica State
//!
//! The replication log and version store of one metadata node, plus the
//! apply cursor that ties them together. Every node guards one of these
//! behind a single lock.

use crate::oplog::{LogEntry, LogIndex, ReplicationLog, Version};
use super::store::VersionStore;

/// Log, store and apply progress of a single node
#[derive(Debug, Default)]
pub struct ReplicaState {
    log: ReplicationLog,
    store: VersionStore,
    /// Number of log entries applied to the store (last applied index + 1)
    applied_len: u64,
}

impl ReplicaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replication log
    pub fn log(&self) -> &ReplicationLog {
        &self.log
    }

    pub(crate) fn log_mut(&mut self) -> &mut ReplicationLog {
        &mut self.log
    }

    /// Version store
    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Current version of a file
    pub fn version(&self, filename: &str) -> Version {
        self.store.version(filename)
    }

    /// Index of the last applied entry
    pub fn last_applied(&self) -> Option<LogIndex> {
        self.applied_len.checked_sub(1)
    }

    /// Number of applied entries
    pub fn applied_len(&self) -> u64 {
        self.applied_len
    }

    /// Apply every entry past the apply cursor, in index order.
    /// Returns the number of entries applied.
    pub fn apply_pending(&mut self) -> usize {
        let end = self.log.len();
        if self.applied_len >= end {
            return 0;
        }

        let entries = self.log.range(self.applied_len, end);
        for entry in entries {
            self.store.apply(entry);
        }

        let applied = entries.len();
        self.applied_len = end;
        applied
    }

    /// Replace the log suffix starting at `entries[0].index` with `entries`.
    ///
    /// If an already-applied entry is replaced by a different one, the
    /// apply cursor moves back to the first difference so the replacement
    /// range is applied again. Identical entries keep their applied status.
    pub(crate) fn replace_suffix(&mut self, entries: Vec<LogEntry>) {
        let Some(start) = entries.first().map(|e| e.index) else {
            return;
        };

        // Entries past the batch are dropped too, so an unchanged batch
        // still diverges at its end if the old log was longer.
        let divergence = entries
            .iter()
            .find(|incoming| self.log.get(incoming.index) != Some(*incoming))
            .map(|incoming| incoming.index)
            .unwrap_or(start + entries.len() as u64);

        if divergence < self.applied_len {
            tracing::warn!(
                "Log diverged at index {} (applied through {}), re-applying",
                divergence,
                self.applied_len
            );
            self.applied_len = divergence;
        }

        self.log.truncate(start);
        for entry in entries {
            self.log.push(entry);
        }
    }
}
