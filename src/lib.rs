//! WolfSync - Distributed File Sync Metadata Service
//!
//! Clients store files as content-addressed blocks in a block store, while
//! a small cluster of metadata nodes tracks, for each filename, a version
//! and the ordered list of block hashes.
//!
//! # Architecture
//!
//! One metadata node is the leader, fixed by configuration. It accepts
//! every write, commits it with a quorum-gated two-phase commit over an
//! append-only operation log, and periodically pushes its log to the
//! followers so they converge. Any node can be crashed and restored at
//! runtime for fault-injection testing.
//!
//! # Features
//!
//! - Optimistic per-file versioning with missing-block negotiation
//! - Quorum commit that tolerates unreachable followers
//! - Background log reconciliation that repairs divergent followers
//! - Framed TCP protocol with CRC32 checksums
//! - HTTP status and fault-injection API

pub mod config;
pub mod error;
pub mod oplog;
pub mod state;
pub mod replication;
pub mod network;
pub mod block;
pub mod metadata;
pub mod client;
pub mod api;

pub use config::WolfSyncConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfSyncConfig;
    pub use crate::error::{Error, Result};
    pub use crate::oplog::{Command, FileOp, LogEntry, ReplicationLog};
    pub use crate::state::{ReplicaState, VersionStore};
    pub use crate::replication::{Message, WriteResult, WriteStatus};
    pub use crate::block::{BlockStore, MemoryBlockStore};
    pub use crate::metadata::{MetadataNode, MetadataService, NodeRole};
    pub use crate::client::{SyncClient, SyncOutcome};
}
