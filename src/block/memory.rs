//! In-memory block store

use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::BlockStore;
use crate::error::Result;

/// Hash -> bytes map held in memory
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn has_block(&self, hash: &str) -> Result<bool> {
        Ok(self.blocks.read().await.contains_key(hash))
    }

    async fn get_block(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().await.get(hash).cloned())
    }

    async fn store_block(&self, hash: &str, data: Vec<u8>) -> Result<()> {
        tracing::debug!("Stored block {} ({} bytes)", hash, data.len());
        self.blocks.write().await.insert(hash.to_string(), data);
        Ok(())
    }
}
