//! Follower-side Replication Handlers
//!
//! Handles prepare votes and appended log suffixes coming from the
//! leader. Callers hold the node lock for the duration of each call.

use crate::oplog::{LogEntry, LogIndex};
use crate::state::ReplicaState;

/// Vote on a two-phase commit prepare.
///
/// Accepted only when the entry extends the log by exactly one position.
/// An accepted entry is logged but not applied until reconciliation
/// delivers it.
pub fn handle_prepare(state: &mut ReplicaState, entry: LogEntry) -> bool {
    let log_len = state.log().len();
    if entry.index != log_len {
        tracing::debug!(
            "Rejecting prepare for entry #{} (log length {})",
            entry.index,
            log_len
        );
        return false;
    }

    tracing::debug!("Prepared entry #{} for {}", entry.index, entry.filename());
    state.log_mut().push(entry)
}

/// Install a log suffix sent by the leader and apply it.
///
/// Returns the resulting log length, which the leader uses as its next
/// cursor for this follower.
pub fn handle_append_entries(
    state: &mut ReplicaState,
    from_index: LogIndex,
    entries: Vec<LogEntry>,
) -> u64 {
    let log_len = state.log().len();

    let Some(first) = entries.first().map(|e| e.index) else {
        // The leader holds nothing past from_index, so an unapplied tail
        // beyond it is left over from an aborted prepare.
        if from_index < log_len && from_index >= state.applied_len() {
            tracing::debug!(
                "Dropping {} unapplied entries from index {}",
                log_len - from_index,
                from_index
            );
            state.log_mut().truncate(from_index);
        }
        return state.log().len();
    };

    if first > log_len {
        tracing::debug!("Gap before entry #{} (log length {}), waiting for earlier entries", first, log_len);
        return log_len;
    }

    let contiguous = entries
        .iter()
        .enumerate()
        .all(|(offset, e)| e.index == first + offset as u64);
    if !contiguous {
        tracing::warn!("Ignoring non-contiguous batch starting at #{}", first);
        return log_len;
    }

    if first != from_index {
        tracing::debug!("Batch starts at #{} but was sent from {}", first, from_index);
    }

    let count = entries.len();
    state.replace_suffix(entries);
    let applied = state.apply_pending();

    tracing::trace!(
        "Appended {} entries from #{}, applied {}, log length {}",
        count,
        first,
        applied,
        state.log().len()
    );

    state.log().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::{Command, FileOp, ReplicationLog};

    fn leader_log(count: u64) -> ReplicationLog {
        let mut log = ReplicationLog::new();
        for v in 1..=count {
            log.append(Command::Write, FileOp::new("a.txt", v, vec![format!("h{}", v)]));
        }
        log
    }

    #[test]
    fn test_prepare_accepts_only_next_index() {
        let mut state = ReplicaState::new();
        let log = leader_log(2);

        assert!(!handle_prepare(&mut state, log.get(1).unwrap().clone()));
        assert!(handle_prepare(&mut state, log.get(0).unwrap().clone()));
        assert!(!handle_prepare(&mut state, log.get(0).unwrap().clone()));

        // Prepared but not applied
        assert_eq!(state.log().len(), 1);
        assert_eq!(state.version("a.txt"), 0);
    }

    #[test]
    fn test_append_applies_entries() {
        let mut state = ReplicaState::new();
        let log = leader_log(3);

        let len = handle_append_entries(&mut state, 0, log.entries_from(0));
        assert_eq!(len, 3);
        assert_eq!(state.version("a.txt"), 3);
        assert_eq!(state.last_applied(), Some(2));
    }

    #[test]
    fn test_append_applies_prepared_entries() {
        let mut state = ReplicaState::new();
        let log = leader_log(1);
        assert!(handle_prepare(&mut state, log.get(0).unwrap().clone()));

        assert_eq!(handle_append_entries(&mut state, 0, log.entries_from(0)), 1);
        assert_eq!(state.version("a.txt"), 1);
    }

    #[test]
    fn test_append_with_gap_is_ignored() {
        let mut state = ReplicaState::new();
        let log = leader_log(4);

        let len = handle_append_entries(&mut state, 2, log.entries_from(2));
        assert_eq!(len, 0);
        assert!(state.log().is_empty());
    }

    #[test]
    fn test_empty_append_reports_length() {
        let mut state = ReplicaState::new();
        let log = leader_log(2);
        handle_append_entries(&mut state, 0, log.entries_from(0));

        assert_eq!(handle_append_entries(&mut state, 2, Vec::new()), 2);
        assert_eq!(handle_append_entries(&mut state, 0, Vec::new()), 2);
        assert_eq!(state.log().len(), 2);
    }

    #[test]
    fn test_empty_append_drops_aborted_prepare() {
        let mut state = ReplicaState::new();
        let mut aborted = ReplicationLog::new();
        let entry = aborted.append(Command::Write, FileOp::new("a.txt", 1, vec!["h1".into()]));
        assert!(handle_prepare(&mut state, entry));

        // Leader log is empty: nothing past index 0 is authoritative
        assert_eq!(handle_append_entries(&mut state, 0, Vec::new()), 0);
        assert!(state.log().is_empty());
        assert_eq!(state.version("a.txt"), 0);
    }

    #[test]
    fn test_append_overwrites_speculative_tail() {
        let mut state = ReplicaState::new();
        let log = leader_log(1);
        handle_append_entries(&mut state, 0, log.entries_from(0));

        let mut other = leader_log(1);
        let speculative = other.append(Command::Write, FileOp::new("b.txt", 1, vec!["x".into()]));
        assert!(handle_prepare(&mut state, speculative));

        let mut authoritative = leader_log(1);
        authoritative.append(Command::Delete, FileOp::new("a.txt", 2, Vec::new()));

        assert_eq!(handle_append_entries(&mut state, 1, authoritative.entries_from(1)), 2);
        assert_eq!(state.version("b.txt"), 0);
        assert!(state.store().get("a.txt").unwrap().is_deleted());
    }

    #[test]
    fn test_non_contiguous_batch_is_rejected() {
        let mut state = ReplicaState::new();
        let log = leader_log(3);
        let batch = vec![log.get(0).unwrap().clone(), log.get(2).unwrap().clone()];

        assert_eq!(handle_append_entries(&mut state, 0, batch), 0);
        assert!(state.log().is_empty());
    }
}
