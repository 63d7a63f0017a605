//! Block Store Module
//!
//! Content-addressed byte storage. Metadata nodes only ever ask whether
//! a block exists; clients upload and download block bytes.

mod memory;
mod remote;

pub use memory::MemoryBlockStore;
pub use remote::BlockClient;

use std::sync::Arc;
use async_trait::async_trait;

use crate::error::Result;
use crate::network::MessageHandler;
use crate::replication::{ErrorCode, Message};

/// Content-addressed block storage
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Check whether a block is stored
    async fn has_block(&self, hash: &str) -> Result<bool>;

    /// Fetch a block's bytes
    async fn get_block(&self, hash: &str) -> Result<Option<Vec<u8>>>;

    /// Store a block under its hash (overwrites are idempotent)
    async fn store_block(&self, hash: &str, data: Vec<u8>) -> Result<()>;
}

/// Answer one block store request
pub async fn handle_block_message(store: &dyn BlockStore, message: Message) -> Message {
    let result = match message {
        Message::Ping => Ok(Message::Pong),
        Message::HasBlock { hash } => store
            .has_block(&hash)
            .await
            .map(|value| Message::Answer { value }),
        Message::GetBlock { hash } => store
            .get_block(&hash)
            .await
            .map(|data| Message::BlockData { hash, data }),
        Message::StoreBlock { hash, data } => store
            .store_block(&hash, data)
            .await
            .map(|_| Message::Ack),
        other => {
            return Message::error(
                ErrorCode::BadRequest,
                format!("Block store cannot handle {}", other.type_name()),
            );
        }
    };

    result.unwrap_or_else(|e| Message::error(ErrorCode::Internal, e.to_string()))
}

/// Build a network handler serving a block store
pub fn block_handler(store: Arc<dyn BlockStore>) -> MessageHandler {
    Arc::new(move |peer, message| {
        let store = Arc::clone(&store);
        Box::pin(async move {
            tracing::trace!("Block request {} from {}", message.type_name(), peer);
            handle_block_message(store.as_ref(), message).await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_block_dispatch() {
        let store = MemoryBlockStore::new();

        let reply = handle_block_message(&store, Message::StoreBlock {
            hash: "h1".into(),
            data: b"hello".to_vec(),
        }).await;
        assert!(matches!(reply, Message::Ack));

        match handle_block_message(&store, Message::HasBlock { hash: "h1".into() }).await {
            Message::Answer { value } => assert!(value),
            other => panic!("Wrong message type: {}", other.type_name()),
        }

        match handle_block_message(&store, Message::GetBlock { hash: "nope".into() }).await {
            Message::BlockData { data, .. } => assert!(data.is_none()),
            other => panic!("Wrong message type: {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_block_dispatch_rejects_metadata_requests() {
        let store = MemoryBlockStore::new();
        let reply = handle_block_message(&store, Message::ReadFile { filename: "a".into() }).await;

        match reply {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::BadRequest),
            other => panic!("Wrong message type: {}", other.type_name()),
        }
    }
}
