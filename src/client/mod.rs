//! Client Module
//!
//! Uploads, downloads and deletes files against the leader and the block
//! store.

pub mod chunker;
mod sync;

pub use chunker::{Block, BLOCK_SIZE};
pub use sync::{SyncClient, SyncOutcome};
