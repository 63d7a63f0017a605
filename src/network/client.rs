//! Network Client
//!
//! TCP client for connecting to other nodes.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{read_message, write_message};
use crate::replication::Message;
use crate::error::{Error, Result};

/// Idle connections kept per peer
const MAX_IDLE_PER_PEER: usize = 4;

/// Connection pool entry
struct PoolEntry {
    stream: TcpStream,
    last_used: Instant,
}

/// Network client for connecting to peer nodes
///
/// A pooled connection is checked out for the duration of one exchange.
/// Connections whose exchange fails or times out are never returned.
pub struct NetworkClient {
    /// Connection pool: address -> idle connections
    pool: Mutex<HashMap<String, Vec<PoolEntry>>>,
    /// Connection timeout
    connect_timeout: Duration,
    /// Request timeout
    request_timeout: Duration,
}

impl NetworkClient {
    /// Create a new network client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            pool: Mutex::new(HashMap::new()),
            connect_timeout,
            request_timeout,
        }
    }

    /// Send a message to a peer and wait for response
    pub async fn send(&self, address: &str, message: Message) -> Result<Message> {
        let result = timeout(
            self.request_timeout,
            self.send_inner(address, message),
        ).await;

        match result {
            Ok(inner_result) => inner_result,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Send without timeout wrapper
    async fn send_inner(&self, address: &str, message: Message) -> Result<Message> {
        // Try an idle pooled connection first
        if let Some(mut entry) = self.checkout(address).await {
            match exchange(&mut entry.stream, &message).await {
                Ok(response) => {
                    entry.last_used = Instant::now();
                    self.checkin(address, entry).await;
                    return Ok(response);
                }
                Err(e) => {
                    tracing::debug!("Pooled connection to {} failed: {}", address, e);
                }
            }
        }

        // Create new connection
        let mut stream = self.connect(address).await?;
        let response = exchange(&mut stream, &message).await?;

        self.checkin(address, PoolEntry {
            stream,
            last_used: Instant::now(),
        }).await;

        Ok(response)
    }

    /// Connect to an address
    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let result = timeout(
            self.connect_timeout,
            TcpStream::connect(address),
        ).await;

        match result {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Take an idle connection out of the pool
    async fn checkout(&self, address: &str) -> Option<PoolEntry> {
        let mut pool = self.pool.lock().await;
        pool.get_mut(address).and_then(|idle| idle.pop())
    }

    /// Return a connection to the pool
    async fn checkin(&self, address: &str, entry: PoolEntry) {
        let mut pool = self.pool.lock().await;
        let idle = pool.entry(address.to_string()).or_default();
        if idle.len() < MAX_IDLE_PER_PEER {
            idle.push(entry);
        }
    }

    /// Clean up stale connections
    pub async fn cleanup_stale(&self, max_idle: Duration) {
        let mut pool = self.pool.lock().await;
        let now = Instant::now();

        for (addr, idle) in pool.iter_mut() {
            let before = idle.len();
            idle.retain(|e| now.duration_since(e.last_used) <= max_idle);
            if idle.len() != before {
                tracing::debug!("Removed {} stale connection(s) to {}", before - idle.len(), addr);
            }
        }
        pool.retain(|_, idle| !idle.is_empty());
    }

    /// Close all connections
    pub async fn close_all(&self) {
        self.pool.lock().await.clear();
    }

    /// Get idle connection count
    pub async fn connection_count(&self) -> usize {
        self.pool.lock().await.values().map(Vec::len).sum()
    }
}

/// One request/response exchange on a stream
async fn exchange(stream: &mut TcpStream, message: &Message) -> Result<Message> {
    let (mut reader, mut writer) = stream.split();
    write_message(&mut writer, message).await?;
    read_message(&mut reader).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = NetworkClient::new(
            Duration::from_secs(5),
            Duration::from_secs(10),
        );

        assert_eq!(client.connection_count().await, 0);
        client.cleanup_stale(Duration::from_secs(1)).await;
        client.close_all().await;
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let client = NetworkClient::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
        );

        // Nothing listens on a freshly released port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = client.send(&address, Message::Ping).await;
        assert!(result.is_err());
        assert!(matches!(
            result,
            Err(Error::ConnectionFailed { .. }) | Err(Error::ConnectionTimeout(_))
        ));
    }
}
