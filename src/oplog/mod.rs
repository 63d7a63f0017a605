//! Replication Log Module
//!
//! Append-only, in-memory sequence of metadata operations. Entries are
//! indexed contiguously from zero; the only way an entry disappears is
//! by truncating a suffix.

pub mod entry;

pub use entry::{Command, FileOp, LogEntry, LogIndex, Version, TOMBSTONE_HASH};

/// Ordered, gap-free sequence of log entries
#[derive(Debug, Default, Clone)]
pub struct ReplicationLog {
    entries: Vec<LogEntry>,
}

impl ReplicationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries (also the index the next entry will get)
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry by index
    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        self.entries.get(index as usize)
    }

    /// Create and append a new entry at the end of the log
    pub fn append(&mut self, command: Command, op: FileOp) -> LogEntry {
        let entry = LogEntry::new(self.len(), command, op);
        self.entries.push(entry.clone());
        entry
    }

    /// Append an entry created elsewhere. Refused unless it lands exactly
    /// at the end of the log.
    pub fn push(&mut self, entry: LogEntry) -> bool {
        if entry.index != self.len() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove every entry at `from` and beyond
    pub fn truncate(&mut self, from: LogIndex) {
        self.entries.truncate(from as usize);
    }

    /// Copy the suffix starting at `from` (empty when `from` is past the end)
    pub fn entries_from(&self, from: LogIndex) -> Vec<LogEntry> {
        let start = (from as usize).min(self.entries.len());
        self.entries[start..].to_vec()
    }

    /// Borrow the entries in `[from, to)`, clamped to the log bounds
    pub fn range(&self, from: LogIndex, to: LogIndex) -> &[LogEntry] {
        let end = (to as usize).min(self.entries.len());
        let start = (from as usize).min(end);
        &self.entries[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str, version: Version) -> FileOp {
        FileOp::new(name, version, vec![format!("{}-{}", name, version)])
    }

    #[test]
    fn test_append_assigns_sequential_indexes() {
        let mut log = ReplicationLog::new();
        assert!(log.is_empty());

        let a = log.append(Command::Write, op("a", 1));
        let b = log.append(Command::Write, op("b", 1));

        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_eq!(log.len(), 2);
        assert!(log.entries_from(0).iter().enumerate().all(|(i, e)| e.index == i as u64));
    }

    #[test]
    fn test_push_rejects_gaps_and_overwrites() {
        let mut log = ReplicationLog::new();
        log.append(Command::Write, op("a", 1));

        let overwrite = LogEntry::new(0, Command::Write, op("x", 1));
        let gap = LogEntry::new(5, Command::Write, op("x", 1));
        let next = LogEntry::new(1, Command::Delete, op("a", 2));

        assert!(!log.push(overwrite));
        assert!(!log.push(gap));
        assert!(log.push(next));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_truncate_and_suffix() {
        let mut log = ReplicationLog::new();
        for v in 1..=5 {
            log.append(Command::Write, op("a", v));
        }

        assert_eq!(log.entries_from(3).len(), 2);
        assert!(log.entries_from(9).is_empty());
        assert_eq!(log.range(1, 3).len(), 2);
        assert!(log.range(4, 2).is_empty());

        log.truncate(2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1).unwrap().op.version, 2);
        assert!(log.get(2).is_none());
    }
}
