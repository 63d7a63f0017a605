//! Sync client
//!
//! Talks to the leader for metadata and to the block store for content.
//! On `OLD_VERSION` the client bumps its own version guess and retries;
//! it does not adopt the version reported by the server.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::chunker;
use crate::block::{BlockClient, BlockStore};
use crate::config::WolfSyncConfig;
use crate::error::{Error, Result};
use crate::metadata::{MetadataClient, MetadataService};
use crate::network::NetworkClient;
use crate::oplog::Version;
use crate::replication::WriteStatus;
use crate::state::is_tombstone;

/// Result of a client command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Done; the file is now at `version`
    Ok { version: Version },
    /// File does not exist (locally for upload, remotely otherwise)
    NotFound,
    /// The configured leader is not the leader
    NotLeader,
    /// Leader could not reach quorum
    Aborted { current_version: Version },
    /// Version kept conflicting after the configured number of attempts
    RetriesExhausted { attempts: u32 },
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Ok { .. } => write!(f, "OK"),
            SyncOutcome::NotFound => write!(f, "Not Found"),
            SyncOutcome::NotLeader => write!(f, "Not Leader"),
            SyncOutcome::Aborted { .. } => write!(f, "Abort"),
            SyncOutcome::RetriesExhausted { attempts } => {
                write!(f, "Gave up after {} attempts", attempts)
            }
        }
    }
}

/// File sync client
pub struct SyncClient {
    leader: Arc<dyn MetadataService>,
    blocks: Arc<dyn BlockStore>,
    max_retries: u32,
}

impl SyncClient {
    pub fn new(leader: Arc<dyn MetadataService>, blocks: Arc<dyn BlockStore>, max_retries: u32) -> Self {
        Self {
            leader,
            blocks,
            max_retries: max_retries.max(1),
        }
    }

    /// Build a client for the leader and block store named in `config`
    pub fn connect(config: &WolfSyncConfig) -> Result<Self> {
        let network = Arc::new(NetworkClient::new(config.connect_timeout(), config.rpc_timeout()));
        let leader = config.leader_node()?;

        Ok(Self::new(
            Arc::new(MetadataClient::new(&leader.address, Arc::clone(&network))),
            Arc::new(BlockClient::new(&config.block.address, network)),
            config.client.max_retries,
        ))
    }

    /// Current version of a file on the leader
    pub async fn get_version(&self, filename: &str) -> Result<Version> {
        self.leader.get_version(filename).await
    }

    /// Upload a local file under its base name
    pub async fn upload(&self, path: &Path) -> Result<SyncOutcome> {
        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(SyncOutcome::NotFound);
        };

        let blocks = match chunker::read_blocks(path) {
            Ok(blocks) => blocks,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncOutcome::NotFound);
            }
            Err(e) => return Err(e),
        };

        let hashes: Vec<String> = blocks.iter().map(|b| b.hash.clone()).collect();
        let by_hash: HashMap<&str, &[u8]> = blocks
            .iter()
            .map(|b| (b.hash.as_str(), b.data.as_slice()))
            .collect();

        let mut version = self.leader.get_version(&filename).await? + 1;
        for _ in 0..self.max_retries {
            let reply = self.leader.modify_file(&filename, version, hashes.clone()).await?;
            match reply.result {
                WriteStatus::Ok => {
                    tracing::info!("Uploaded {} at version {}", filename, reply.current_version);
                    return Ok(SyncOutcome::Ok { version: reply.current_version });
                }
                WriteStatus::NotLeader => return Ok(SyncOutcome::NotLeader),
                WriteStatus::Abort => {
                    return Ok(SyncOutcome::Aborted { current_version: reply.current_version });
                }
                WriteStatus::OldVersion => {
                    tracing::debug!("Version {} of {} is stale, trying {}", version, filename, version + 1);
                    version += 1;
                }
                WriteStatus::MissingBlocks => {
                    tracing::debug!("Uploading {} missing blocks for {}", reply.missing_blocks.len(), filename);
                    for hash in &reply.missing_blocks {
                        let data = by_hash
                            .get(hash.as_str())
                            .ok_or_else(|| Error::BlockNotFound(hash.clone()))?;
                        self.blocks.store_block(hash, data.to_vec()).await?;
                    }
                }
            }
        }

        Ok(SyncOutcome::RetriesExhausted { attempts: self.max_retries })
    }

    /// Download a file into `dir`, reusing blocks already present there
    pub async fn download(&self, filename: &str, dir: &Path) -> Result<SyncOutcome> {
        let (version, hashes) = self.leader.read_file(filename).await?;
        if version == 0 || hashes.is_empty() || is_tombstone(&hashes) {
            return Ok(SyncOutcome::NotFound);
        }

        let local = match chunker::scan_dir(dir) {
            Ok(local) => local,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncOutcome::NotFound);
            }
            Err(e) => return Err(e),
        };

        let mut content = Vec::with_capacity(hashes.len());
        let mut fetched = 0;
        for hash in &hashes {
            match local.get(hash) {
                Some(data) => content.push(data.clone()),
                None => {
                    let data = self
                        .blocks
                        .get_block(hash)
                        .await?
                        .ok_or_else(|| Error::BlockNotFound(hash.clone()))?;
                    content.push(data);
                    fetched += 1;
                }
            }
        }

        chunker::write_blocks(&dir.join(filename), &content)?;
        tracing::info!(
            "Downloaded {} version {} ({} blocks, {} fetched)",
            filename,
            version,
            hashes.len(),
            fetched
        );
        Ok(SyncOutcome::Ok { version })
    }

    /// Delete a file
    pub async fn delete(&self, filename: &str) -> Result<SyncOutcome> {
        let current = self.leader.get_version(filename).await?;
        if current == 0 {
            return Ok(SyncOutcome::NotFound);
        }

        let mut version = current + 1;
        for _ in 0..self.max_retries {
            let reply = self.leader.delete_file(filename, version).await?;
            match reply.result {
                WriteStatus::Ok => {
                    tracing::info!("Deleted {} at version {}", filename, reply.current_version);
                    return Ok(SyncOutcome::Ok { version: reply.current_version });
                }
                WriteStatus::NotLeader => return Ok(SyncOutcome::NotLeader),
                WriteStatus::Abort => {
                    return Ok(SyncOutcome::Aborted { current_version: reply.current_version });
                }
                WriteStatus::OldVersion => version += 1,
                WriteStatus::MissingBlocks => {
                    return Err(Error::Internal("delete answered with missing blocks".into()));
                }
            }
        }

        Ok(SyncOutcome::RetriesExhausted { attempts: self.max_retries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::block::MemoryBlockStore;
    use crate::metadata::MetadataNode;
    use crate::oplog::{LogEntry, LogIndex};
    use crate::replication::{ReplicationConfig, WriteResult};

    fn single_node() -> (Arc<MetadataNode>, Arc<MemoryBlockStore>) {
        let blocks = Arc::new(MemoryBlockStore::new());
        let leader = Arc::new(MetadataNode::leader(1, blocks.clone(), Vec::new(), ReplicationConfig::default()));
        (leader, blocks)
    }

    fn client(leader: Arc<dyn MetadataService>, blocks: Arc<MemoryBlockStore>, max_retries: u32) -> SyncClient {
        SyncClient::new(leader, blocks, max_retries)
    }

    /// Reports every file at version 0, so writes start from a stale guess
    struct StaleVersions(Arc<MetadataNode>);

    #[async_trait]
    impl MetadataService for StaleVersions {
        fn label(&self) -> &str {
            "stale"
        }
        async fn ping(&self) -> Result<()> {
            self.0.ping().await
        }
        async fn read_file(&self, filename: &str) -> Result<(Version, Vec<String>)> {
            self.0.read_file(filename).await
        }
        async fn get_version(&self, _filename: &str) -> Result<Version> {
            Ok(0)
        }
        async fn modify_file(&self, filename: &str, version: Version, hashes: Vec<String>) -> Result<WriteResult> {
            self.0.modify_file(filename, version, hashes).await
        }
        async fn delete_file(&self, filename: &str, version: Version) -> Result<WriteResult> {
            self.0.delete_file(filename, version).await
        }
        async fn prepare(&self, entry: LogEntry) -> Result<bool> {
            self.0.prepare(entry).await
        }
        async fn append_entries(&self, from_index: LogIndex, entries: Vec<LogEntry>) -> Result<u64> {
            self.0.append_entries(from_index, entries).await
        }
        async fn is_leader(&self) -> Result<bool> {
            self.0.is_leader().await
        }
        async fn crash(&self) -> Result<()> {
            self.0.crash().await
        }
        async fn restore(&self) -> Result<()> {
            self.0.restore().await
        }
        async fn is_crashed(&self) -> Result<bool> {
            self.0.is_crashed().await
        }
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let (leader, blocks) = single_node();
        let client = client(leader.clone(), blocks.clone(), 8);

        let src = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..chunker::BLOCK_SIZE * 3 + 5).map(|i| (i % 13) as u8).collect();
        let path = src.path().join("notes.txt");
        std::fs::write(&path, &data).unwrap();

        assert_eq!(client.upload(&path).await.unwrap(), SyncOutcome::Ok { version: 1 });
        assert_eq!(client.get_version("notes.txt").await.unwrap(), 1);
        assert_eq!(blocks.len().await, 4);

        let dst = tempfile::tempdir().unwrap();
        assert_eq!(
            client.download("notes.txt", dst.path()).await.unwrap(),
            SyncOutcome::Ok { version: 1 }
        );
        assert_eq!(std::fs::read(dst.path().join("notes.txt")).unwrap(), data);

        // Uploading again bumps the version, no new blocks needed
        assert_eq!(client.upload(&path).await.unwrap(), SyncOutcome::Ok { version: 2 });
        assert_eq!(blocks.len().await, 4);
    }

    #[tokio::test]
    async fn test_upload_missing_local_file() {
        let (leader, blocks) = single_node();
        let client = client(leader, blocks, 8);
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            client.upload(&dir.path().join("absent.txt")).await.unwrap(),
            SyncOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_delete_then_download() {
        let (leader, blocks) = single_node();
        let client = client(leader, blocks, 8);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        client.upload(&path).await.unwrap();
        assert_eq!(client.delete("a.txt").await.unwrap(), SyncOutcome::Ok { version: 2 });
        assert_eq!(client.get_version("a.txt").await.unwrap(), 2);

        let out = tempfile::tempdir().unwrap();
        assert_eq!(client.download("a.txt", out.path()).await.unwrap(), SyncOutcome::NotFound);
        assert_eq!(client.delete("never.txt").await.unwrap(), SyncOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_download_into_missing_dir() {
        let (leader, blocks) = single_node();
        let client = client(leader, blocks, 8);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();
        client.upload(&path).await.unwrap();

        let missing = dir.path().join("nowhere");
        assert_eq!(client.download("a.txt", &missing).await.unwrap(), SyncOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_stale_version_guess_is_bumped() {
        let (leader, blocks) = single_node();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"v").unwrap();

        let direct = client(leader.clone(), blocks.clone(), 8);
        for _ in 0..3 {
            direct.upload(&path).await.unwrap();
        }

        let stale = client(Arc::new(StaleVersions(leader.clone())), blocks.clone(), 8);
        assert_eq!(stale.upload(&path).await.unwrap(), SyncOutcome::Ok { version: 4 });

        let limited = client(Arc::new(StaleVersions(leader)), blocks, 2);
        assert_eq!(
            limited.upload(&path).await.unwrap(),
            SyncOutcome::RetriesExhausted { attempts: 2 }
        );
    }

    #[tokio::test]
    async fn test_follower_reports_not_leader() {
        let blocks = Arc::new(MemoryBlockStore::new());
        let follower = Arc::new(MetadataNode::follower(2, blocks.clone(), 3));
        let client = client(follower, blocks, 8);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(client.upload(&path).await.unwrap(), SyncOutcome::NotLeader);
    }

    #[tokio::test]
    async fn test_abort_is_reported() {
        let blocks = Arc::new(MemoryBlockStore::new());
        let followers: Vec<Arc<MetadataNode>> = (2..=3)
            .map(|id| Arc::new(MetadataNode::follower(id, blocks.clone(), 3)))
            .collect();
        followers[0].crash().await.unwrap();
        let services = followers
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn MetadataService>)
            .collect();
        let leader = Arc::new(MetadataNode::leader(1, blocks.clone(), services, ReplicationConfig::default()));
        let client = client(leader, blocks, 8);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(
            client.upload(&path).await.unwrap(),
            SyncOutcome::Aborted { current_version: 0 }
        );
        assert_eq!(SyncOutcome::Aborted { current_version: 0 }.to_string(), "Abort");
    }
}
