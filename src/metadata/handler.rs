//! Metadata request dispatch

use std::sync::Arc;

use super::{MetadataNode, MetadataService};
use crate::error::Error;
use crate::network::MessageHandler;
use crate::replication::{ErrorCode, Message};

/// Answer one metadata request
pub async fn handle_metadata_message(node: &MetadataNode, message: Message) -> Message {
    let result = match message {
        Message::Ping => node.ping().await.map(|_| Message::Pong),
        Message::ReadFile { filename } => node
            .read_file(&filename)
            .await
            .map(|(version, block_hashes)| Message::FileInfo {
                filename,
                version,
                block_hashes,
            }),
        Message::GetVersion { filename } => node
            .get_version(&filename)
            .await
            .map(|version| Message::Version { filename, version }),
        Message::ModifyFile {
            filename,
            version,
            block_hashes,
        } => node
            .modify_file(&filename, version, block_hashes)
            .await
            .map(Message::WriteResult),
        Message::DeleteFile { filename, version } => node
            .delete_file(&filename, version)
            .await
            .map(Message::WriteResult),
        Message::Prepare { entry } => node
            .prepare(entry)
            .await
            .map(|accepted| Message::PrepareResponse { accepted }),
        Message::AppendEntries { from_index, entries } => node
            .append_entries(from_index, entries)
            .await
            .map(|log_length| Message::AppendEntriesResponse { log_length }),
        Message::IsLeader => node.is_leader().await.map(|value| Message::Answer { value }),
        Message::IsCrashed => node.is_crashed().await.map(|value| Message::Answer { value }),
        Message::Crash => node.crash().await.map(|_| Message::Ack),
        Message::Restore => node.restore().await.map(|_| Message::Ack),
        other => {
            return Message::error(
                ErrorCode::BadRequest,
                format!("Metadata node cannot handle {}", other.type_name()),
            );
        }
    };

    result.unwrap_or_else(|e| match e {
        Error::NodeCrashed => Message::error(ErrorCode::NodeCrashed, e.to_string()),
        e => {
            tracing::warn!("Request failed on node {}: {}", node.id(), e);
            Message::error(ErrorCode::Internal, e.to_string())
        }
    })
}

/// Build a network handler serving a metadata node
pub fn metadata_handler(node: Arc<MetadataNode>) -> MessageHandler {
    Arc::new(move |peer, message| {
        let node = Arc::clone(&node);
        Box::pin(async move {
            tracing::trace!("Metadata request {} from {}", message.type_name(), peer);
            handle_metadata_message(&node, message).await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::block::{block_handler, BlockClient, BlockStore, MemoryBlockStore};
    use crate::error::Error;
    use crate::metadata::MetadataClient;
    use crate::network::{NetworkClient, NetworkServer};
    use crate::replication::{ReplicationConfig, WriteResult};

    async fn spawn(handler: MessageHandler) -> (Arc<NetworkServer>, String) {
        let server = Arc::new(NetworkServer::new("127.0.0.1:0".to_string(), handler));
        let listener = server.listen().await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let serving = Arc::clone(&server);
        tokio::spawn(async move { serving.serve(listener).await });
        (server, address)
    }

    #[tokio::test]
    async fn test_dispatch_maps_crash_to_error_code() {
        let node = MetadataNode::follower(2, Arc::new(MemoryBlockStore::new()), 3);
        node.crash().await.unwrap();

        match handle_metadata_message(&node, Message::ReadFile { filename: "a".into() }).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::NodeCrashed),
            other => panic!("Wrong message type: {}", other.type_name()),
        }

        match handle_metadata_message(&node, Message::IsCrashed).await {
            Message::Answer { value } => assert!(value),
            other => panic!("Wrong message type: {}", other.type_name()),
        }

        let reply = handle_metadata_message(&node, Message::HasBlock { hash: "h".into() }).await;
        assert!(matches!(reply, Message::Error { code: ErrorCode::BadRequest, .. }));
    }

    #[tokio::test]
    async fn test_cluster_over_tcp() {
        let network = Arc::new(NetworkClient::new(Duration::from_secs(1), Duration::from_secs(2)));

        let (block_server, block_address) = spawn(block_handler(Arc::new(MemoryBlockStore::new()))).await;
        let blocks: Arc<dyn BlockStore> = Arc::new(BlockClient::new(&block_address, network.clone()));

        let mut servers = vec![block_server];
        let mut followers: Vec<Arc<dyn MetadataService>> = Vec::new();
        let mut follower_addresses = Vec::new();
        for id in 2..=3 {
            let node = Arc::new(MetadataNode::follower(id, blocks.clone(), 3));
            let (server, address) = spawn(metadata_handler(node)).await;
            servers.push(server);
            followers.push(Arc::new(MetadataClient::new(&address, network.clone())));
            follower_addresses.push(address);
        }

        let leader = Arc::new(MetadataNode::leader(1, blocks.clone(), followers, ReplicationConfig::default()));
        let (server, leader_address) = spawn(metadata_handler(leader.clone())).await;
        servers.push(server);

        let client = MetadataClient::new(&leader_address, network.clone());
        blocks.store_block("h1", b"one".to_vec()).await.unwrap();

        assert!(client.is_leader().await.unwrap());
        assert_eq!(
            client.modify_file("a.txt", 1, vec!["h1".into()]).await.unwrap(),
            WriteResult::ok(1)
        );
        assert_eq!(
            client.modify_file("a.txt", 2, vec!["h2".into()]).await.unwrap(),
            WriteResult::missing_blocks(1, vec!["h2".into()])
        );

        leader.reconciler().unwrap().reconcile_once().await;

        let follower = MetadataClient::new(&follower_addresses[0], network.clone());
        assert_eq!(follower.read_file("a.txt").await.unwrap(), (1, vec!["h1".to_string()]));
        assert_eq!(
            follower.modify_file("a.txt", 2, Vec::new()).await.unwrap(),
            WriteResult::not_leader()
        );

        follower.crash().await.unwrap();
        assert!(matches!(follower.read_file("a.txt").await, Err(Error::NodeCrashed)));
        assert_eq!(follower.get_version("a.txt").await.unwrap(), 1);
        follower.restore().await.unwrap();
        follower.ping().await.unwrap();

        for server in servers {
            server.stop();
        }
    }
}
