//! Replication Protocol
//!
//! Defines the wire protocol spoken by metadata nodes, the block store
//! and clients.

use serde::{Deserialize, Serialize};

use crate::oplog::{LogEntry, LogIndex, Version};

/// Protocol messages for node communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    // ========== Health ==========
    /// Liveness check
    Ping,

    /// Liveness reply
    Pong,

    // ========== File Metadata ==========
    /// Read a file's version and block list
    ReadFile {
        filename: String,
    },

    /// File metadata reply
    FileInfo {
        filename: String,
        version: Version,
        block_hashes: Vec<String>,
    },

    /// Read a file's version (answered even when crashed)
    GetVersion {
        filename: String,
    },

    /// Version reply
    Version {
        filename: String,
        version: Version,
    },

    /// Create or replace a file
    ModifyFile {
        filename: String,
        version: Version,
        block_hashes: Vec<String>,
    },

    /// Delete a file
    DeleteFile {
        filename: String,
        version: Version,
    },

    /// Outcome of a modify/delete
    WriteResult(WriteResult),

    // ========== Log Replication ==========
    /// Two-phase commit prepare (from leader to followers)
    Prepare {
        entry: LogEntry,
    },

    /// Prepare vote
    PrepareResponse {
        accepted: bool,
    },

    /// Append entries request (from leader to followers)
    AppendEntries {
        from_index: LogIndex,
        entries: Vec<LogEntry>,
    },

    /// Append entries response
    AppendEntriesResponse {
        log_length: u64,
    },

    // ========== Control ==========
    /// Ask whether the node is the leader
    IsLeader,

    /// Ask whether the node is crashed
    IsCrashed,

    /// Simulate a crash
    Crash,

    /// Recover from a simulated crash
    Restore,

    /// Boolean reply
    Answer {
        value: bool,
    },

    /// Empty acknowledgement
    Ack,

    // ========== Block Store ==========
    /// Store a block under its content hash
    StoreBlock {
        hash: String,
        data: Vec<u8>,
    },

    /// Fetch a block
    GetBlock {
        hash: String,
    },

    /// Block reply (data is None if absent)
    BlockData {
        hash: String,
        data: Option<Vec<u8>>,
    },

    /// Check for a block
    HasBlock {
        hash: String,
    },

    // ========== Error ==========
    /// Error response
    Error {
        code: ErrorCode,
        message: String,
    },
}

/// Error codes for protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Node refuses reads and writes while crashed
    NodeCrashed,
    /// Request not understood by this service
    BadRequest,
    /// Internal error
    Internal,
}

/// Outcome kinds for a modify/delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteStatus {
    /// Committed
    Ok,
    /// Proposed version is not current + 1
    OldVersion,
    /// Some blocks must be uploaded first
    MissingBlocks,
    /// Request reached a follower
    NotLeader,
    /// Quorum not reached
    Abort,
}

impl std::fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteStatus::Ok => write!(f, "OK"),
            WriteStatus::OldVersion => write!(f, "OLD_VERSION"),
            WriteStatus::MissingBlocks => write!(f, "MISSING_BLOCKS"),
            WriteStatus::NotLeader => write!(f, "NOT_LEADER"),
            WriteStatus::Abort => write!(f, "ABORT"),
        }
    }
}

/// Reply to a modify/delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub result: WriteStatus,
    pub current_version: Version,
    #[serde(default)]
    pub missing_blocks: Vec<String>,
}

impl WriteResult {
    pub fn ok(version: Version) -> Self {
        Self::with_status(WriteStatus::Ok, version)
    }

    pub fn old_version(current: Version) -> Self {
        Self::with_status(WriteStatus::OldVersion, current)
    }

    pub fn missing_blocks(current: Version, missing: Vec<String>) -> Self {
        Self {
            result: WriteStatus::MissingBlocks,
            current_version: current,
            missing_blocks: missing,
        }
    }

    pub fn not_leader() -> Self {
        Self::with_status(WriteStatus::NotLeader, 0)
    }

    pub fn abort(current: Version) -> Self {
        Self::with_status(WriteStatus::Abort, current)
    }

    fn with_status(result: WriteStatus, current_version: Version) -> Self {
        Self {
            result,
            current_version,
            missing_blocks: Vec::new(),
        }
    }
}

impl Message {
    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Build an error reply
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Message::Error {
            code,
            message: message.into(),
        }
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Ping => "Ping",
            Message::Pong => "Pong",
            Message::ReadFile { .. } => "ReadFile",
            Message::FileInfo { .. } => "FileInfo",
            Message::GetVersion { .. } => "GetVersion",
            Message::Version { .. } => "Version",
            Message::ModifyFile { .. } => "ModifyFile",
            Message::DeleteFile { .. } => "DeleteFile",
            Message::WriteResult(_) => "WriteResult",
            Message::Prepare { .. } => "Prepare",
            Message::PrepareResponse { .. } => "PrepareResponse",
            Message::AppendEntries { .. } => "AppendEntries",
            Message::AppendEntriesResponse { .. } => "AppendEntriesResponse",
            Message::IsLeader => "IsLeader",
            Message::IsCrashed => "IsCrashed",
            Message::Crash => "Crash",
            Message::Restore => "Restore",
            Message::Answer { .. } => "Answer",
            Message::Ack => "Ack",
            Message::StoreBlock { .. } => "StoreBlock",
            Message::GetBlock { .. } => "GetBlock",
            Message::BlockData { .. } => "BlockData",
            Message::HasBlock { .. } => "HasBlock",
            Message::Error { .. } => "Error",
        }
    }
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Message length
    pub length: u32,
    /// Message checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Largest body accepted or sent on the wire
    pub const MAX_LENGTH: u32 = 64 * 1024 * 1024;

    /// Create a new frame header. `None` if the body exceeds `MAX_LENGTH`.
    pub fn new(data: &[u8]) -> Option<Self> {
        let length = u32::try_from(data.len()).ok().filter(|l| *l <= Self::MAX_LENGTH)?;
        Some(Self {
            length,
            checksum: crc32fast::hash(data),
        })
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}
