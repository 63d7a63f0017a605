//! Operation Log Entry Types
//!
//! Defines the entries that are appended to a node's replication log
//! and shipped between the leader and its followers.

use serde::{Deserialize, Serialize};

/// Position of an entry in the replication log (zero-based)
pub type LogIndex = u64;

/// Per-file version number (0 means the file does not exist)
pub type Version = u64;

/// Block list marking a deleted file
pub const TOMBSTONE_HASH: &str = "0";

/// Kind of metadata operation carried by a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Create or replace a file's block list
    Write,
    /// Mark a file as deleted
    Delete,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Write => write!(f, "WRITE"),
            Command::Delete => write!(f, "DELETE"),
        }
    }
}

/// File mutation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOp {
    /// Target filename
    pub filename: String,
    /// Version the file will have once the entry is applied
    pub version: Version,
    /// Ordered content hashes (empty for deletes)
    pub block_hashes: Vec<String>,
}

impl FileOp {
    pub fn new(filename: impl Into<String>, version: Version, block_hashes: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            version,
            block_hashes,
        }
    }
}

/// A single entry in the replication log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log position assigned by the leader at append time
    pub index: LogIndex,
    /// Operation kind
    pub command: Command,
    /// File mutation
    pub op: FileOp,
}

impl LogEntry {
    /// Create a new entry
    pub fn new(index: LogIndex, command: Command, op: FileOp) -> Self {
        Self { index, command, op }
    }

    /// Filename touched by this entry
    pub fn filename(&self) -> &str {
        &self.op.filename
    }

    /// Serialize entry to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize entry from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let entry = LogEntry::new(
            7,
            Command::Write,
            FileOp::new("a.txt", 3, vec!["h1".to_string(), "h2".to_string()]),
        );

        let bytes = entry.serialize().unwrap();
        let restored = LogEntry::deserialize(&bytes).unwrap();

        assert_eq!(restored, entry);
        assert_eq!(restored.filename(), "a.txt");
    }

    #[test]
    fn test_entries_with_different_payloads_differ() {
        let a = LogEntry::new(0, Command::Write, FileOp::new("a.txt", 1, vec!["h1".into()]));
        let mut b = a.clone();
        b.op.block_hashes = vec!["h9".into()];

        assert_ne!(a, b);
        assert_eq!(Command::Delete.to_string(), "DELETE");
    }
}
