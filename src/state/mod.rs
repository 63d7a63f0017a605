//! State Management Module
//!
//! Per-node file metadata (the version store) and the replica state
//! that pairs it with the replication log.

mod store;
mod replica;

pub use store::{FileRecord, VersionStore, tombstone, is_tombstone};
pub use replica::ReplicaState;
