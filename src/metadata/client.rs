//! Remote metadata node client

use std::sync::Arc;
use async_trait::async_trait;

use super::MetadataService;
use crate::error::Result;
use crate::network::{unexpected_reply, NetworkClient};
use crate::oplog::{LogEntry, LogIndex, Version};
use crate::replication::{Message, WriteResult};

/// Metadata node reached over the network
pub struct MetadataClient {
    address: String,
    client: Arc<NetworkClient>,
}

impl MetadataClient {
    pub fn new(address: impl Into<String>, client: Arc<NetworkClient>) -> Self {
        Self {
            address: address.into(),
            client,
        }
    }

    async fn call(&self, request: Message) -> Result<Message> {
        self.client.send(&self.address, request).await
    }

    async fn ask(&self, request: Message) -> Result<bool> {
        match self.call(request).await? {
            Message::Answer { value } => Ok(value),
            other => Err(unexpected_reply("Answer", other)),
        }
    }

    async fn control(&self, request: Message) -> Result<()> {
        match self.call(request).await? {
            Message::Ack => Ok(()),
            other => Err(unexpected_reply("Ack", other)),
        }
    }

    async fn write(&self, request: Message) -> Result<WriteResult> {
        match self.call(request).await? {
            Message::WriteResult(result) => Ok(result),
            other => Err(unexpected_reply("WriteResult", other)),
        }
    }
}

#[async_trait]
impl MetadataService for MetadataClient {
    fn label(&self) -> &str {
        &self.address
    }

    async fn ping(&self) -> Result<()> {
        match self.call(Message::Ping).await? {
            Message::Pong => Ok(()),
            other => Err(unexpected_reply("Pong", other)),
        }
    }

    async fn read_file(&self, filename: &str) -> Result<(Version, Vec<String>)> {
        let request = Message::ReadFile {
            filename: filename.to_string(),
        };
        match self.call(request).await? {
            Message::FileInfo { version, block_hashes, .. } => Ok((version, block_hashes)),
            other => Err(unexpected_reply("FileInfo", other)),
        }
    }

    async fn get_version(&self, filename: &str) -> Result<Version> {
        let request = Message::GetVersion {
            filename: filename.to_string(),
        };
        match self.call(request).await? {
            Message::Version { version, .. } => Ok(version),
            other => Err(unexpected_reply("Version", other)),
        }
    }

    async fn modify_file(
        &self,
        filename: &str,
        version: Version,
        block_hashes: Vec<String>,
    ) -> Result<WriteResult> {
        self.write(Message::ModifyFile {
            filename: filename.to_string(),
            version,
            block_hashes,
        })
        .await
    }

    async fn delete_file(&self, filename: &str, version: Version) -> Result<WriteResult> {
        self.write(Message::DeleteFile {
            filename: filename.to_string(),
            version,
        })
        .await
    }

    async fn prepare(&self, entry: LogEntry) -> Result<bool> {
        match self.call(Message::Prepare { entry }).await? {
            Message::PrepareResponse { accepted } => Ok(accepted),
            other => Err(unexpected_reply("PrepareResponse", other)),
        }
    }

    async fn append_entries(&self, from_index: LogIndex, entries: Vec<LogEntry>) -> Result<u64> {
        match self.call(Message::AppendEntries { from_index, entries }).await? {
            Message::AppendEntriesResponse { log_length } => Ok(log_length),
            other => Err(unexpected_reply("AppendEntriesResponse", other)),
        }
    }

    async fn is_leader(&self) -> Result<bool> {
        self.ask(Message::IsLeader).await
    }

    async fn crash(&self) -> Result<()> {
        self.control(Message::Crash).await
    }

    async fn restore(&self) -> Result<()> {
        self.control(Message::Restore).await
    }

    async fn is_crashed(&self) -> Result<bool> {
        self.ask(Message::IsCrashed).await
    }
}
