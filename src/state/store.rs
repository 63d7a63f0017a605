//! Version Store
//!
//! Per-node mapping from filename to its committed version and block list.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

use crate::oplog::{Command, LogEntry, Version, TOMBSTONE_HASH};

/// Committed metadata for a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique key
    pub filename: String,
    /// Current version (never 0 once a record exists)
    pub version: Version,
    /// Ordered content hashes, or the tombstone after a delete
    pub block_hashes: Vec<String>,
}

impl FileRecord {
    /// Check if this record is a tombstone
    pub fn is_deleted(&self) -> bool {
        is_tombstone(&self.block_hashes)
    }
}

/// Block list used for deleted files
pub fn tombstone() -> Vec<String> {
    vec![TOMBSTONE_HASH.to_string()]
}

/// Check whether a block list is the tombstone sentinel
pub fn is_tombstone(block_hashes: &[String]) -> bool {
    block_hashes.len() == 1 && block_hashes[0] == TOMBSTONE_HASH
}

/// Filename -> committed record
#[derive(Debug, Default)]
pub struct VersionStore {
    files: HashMap<String, FileRecord>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a file record
    pub fn get(&self, filename: &str) -> Option<&FileRecord> {
        self.files.get(filename)
    }

    /// Current version of a file (0 if unknown)
    pub fn version(&self, filename: &str) -> Version {
        self.files.get(filename).map(|r| r.version).unwrap_or(0)
    }

    /// Version and block list of a file (0 and empty if unknown)
    pub fn read(&self, filename: &str) -> (Version, Vec<String>) {
        match self.files.get(filename) {
            Some(record) => (record.version, record.block_hashes.clone()),
            None => (0, Vec::new()),
        }
    }

    /// Apply a log entry to the store
    pub fn apply(&mut self, entry: &LogEntry) {
        let block_hashes = match entry.command {
            Command::Write => entry.op.block_hashes.clone(),
            Command::Delete => tombstone(),
        };

        tracing::trace!(
            "Applying {} #{} {} -> v{}",
            entry.command,
            entry.index,
            entry.op.filename,
            entry.op.version
        );

        self.files.insert(
            entry.op.filename.clone(),
            FileRecord {
                filename: entry.op.filename.clone(),
                version: entry.op.version,
                block_hashes,
            },
        );
    }

    /// Number of known files (deleted ones included)
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::FileOp;

    #[test]
    fn test_unknown_file_reads_as_version_zero() {
        let store = VersionStore::new();
        assert_eq!(store.version("missing.txt"), 0);
        assert_eq!(store.read("missing.txt"), (0, Vec::new()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_write_then_delete() {
        let mut store = VersionStore::new();
        let hashes = vec!["h1".to_string(), "h2".to_string()];

        store.apply(&LogEntry::new(0, Command::Write, FileOp::new("a.txt", 1, hashes.clone())));
        assert_eq!(store.read("a.txt"), (1, hashes));
        assert!(!store.get("a.txt").unwrap().is_deleted());

        store.apply(&LogEntry::new(1, Command::Delete, FileOp::new("a.txt", 2, Vec::new())));
        let record = store.get("a.txt").unwrap();
        assert_eq!(record.version, 2);
        assert!(record.is_deleted());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_tombstone_detection() {
        assert!(is_tombstone(&tombstone()));
        assert!(!is_tombstone(&[]));
        assert!(!is_tombstone(&["0".to_string(), "h1".to_string()]));
    }
}
