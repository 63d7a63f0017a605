//! Network Module
//!
//! Handles TCP communication between clients, metadata nodes and the
//! block store. Every exchange is one framed request followed by one
//! framed response on the same connection.

mod server;
mod client;

pub use server::{NetworkServer, MessageHandler};
pub use client::NetworkClient;

use crate::replication::{ErrorCode, Message, FrameHeader};
use crate::error::{Error, Result};

/// Read a framed message from a reader
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    use tokio::io::AsyncReadExt;

    // Read header
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::from_bytes(&header_bytes);

    if header.length > FrameHeader::MAX_LENGTH {
        return Err(Error::Network(format!("Frame too large: {} bytes", header.length)));
    }

    // Read body
    let mut body = vec![0u8; header.length as usize];
    reader.read_exact(&mut body).await?;

    // Verify checksum
    let computed_checksum = crc32fast::hash(&body);
    if computed_checksum != header.checksum {
        return Err(Error::Network("Message checksum mismatch".into()));
    }

    let message = Message::deserialize(&body)?;
    Ok(message)
}

/// Write a framed message to a writer
pub async fn write_message<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let body = message.serialize()?;
    let header = FrameHeader::new(&body)
        .ok_or_else(|| Error::Network(format!("Frame too large: {} bytes", body.len())))?;

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}

/// Turn a reply of the wrong kind into an error, rebuilding typed errors
/// carried in `Message::Error`
pub(crate) fn unexpected_reply(expected: &'static str, reply: Message) -> Error {
    match reply {
        Message::Error { code: ErrorCode::NodeCrashed, .. } => Error::NodeCrashed,
        Message::Error { message, .. } => Error::Remote(message),
        other => Error::UnexpectedResponse {
            expected,
            got: other.type_name(),
        },
    }
}
