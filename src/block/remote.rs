//! Remote block store client

use std::sync::Arc;
use async_trait::async_trait;

use super::BlockStore;
use crate::error::Result;
use crate::network::{unexpected_reply, NetworkClient};
use crate::replication::Message;

/// Block store reached over the network
pub struct BlockClient {
    address: String,
    client: Arc<NetworkClient>,
}

impl BlockClient {
    pub fn new(address: impl Into<String>, client: Arc<NetworkClient>) -> Self {
        Self {
            address: address.into(),
            client,
        }
    }

    /// Check that the block store answers
    pub async fn ping(&self) -> Result<()> {
        match self.client.send(&self.address, Message::Ping).await? {
            Message::Pong => Ok(()),
            other => Err(unexpected_reply("Pong", other)),
        }
    }
}

#[async_trait]
impl BlockStore for BlockClient {
    async fn has_block(&self, hash: &str) -> Result<bool> {
        let request = Message::HasBlock { hash: hash.to_string() };
        match self.client.send(&self.address, request).await? {
            Message::Answer { value } => Ok(value),
            other => Err(unexpected_reply("Answer", other)),
        }
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let request = Message::GetBlock { hash: hash.to_string() };
        match self.client.send(&self.address, request).await? {
            Message::BlockData { data, .. } => Ok(data),
            other => Err(unexpected_reply("BlockData", other)),
        }
    }

    async fn store_block(&self, hash: &str, data: Vec<u8>) -> Result<()> {
        let request = Message::StoreBlock {
            hash: hash.to_string(),
            data,
        };
        match self.client.send(&self.address, request).await? {
            Message::Ack => Ok(()),
            other => Err(unexpected_reply("Ack", other)),
        }
    }
}
