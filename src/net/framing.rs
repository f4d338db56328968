//! Message framing for length-prefixed protocol
//!
//! Handles reading and writing framed messages over streams.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::protocol::{self, DecodeError, EncodeError, MAX_DATAGRAM_SIZE, MAX_MESSAGE_SIZE};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Read a length-prefixed message from a stream
///
/// Format: [4 bytes little-endian length][payload]
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }

    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(FramingError::ConnectionClosed)
        }
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write a length-prefixed message to a stream
///
/// Format: [4 bytes little-endian length][payload]
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    let len_bytes = (data.len() as u32).to_le_bytes();
    stream.write_all(&len_bytes).await?;
    stream.write_all(data).await?;
    stream.flush().await?;

    Ok(())
}

/// Encode and write one message
pub async fn send<W, T>(stream: &mut W, message: &T) -> Result<usize, FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = protocol::encode(message)?;
    write_message(stream, &data).await?;
    Ok(data.len())
}

/// Read and decode one message.
///
/// A frame that does not decode is reported as `Decode` with the stream
/// still positioned at the next frame.
pub async fn recv<R, T>(stream: &mut R) -> Result<T, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let data = read_message(stream).await?;
    Ok(protocol::decode(&data)?)
}

/// Validate datagram size (for unreliable messages)
pub fn validate_datagram_size(data: &[u8]) -> Result<(), FramingError> {
    if data.len() > MAX_DATAGRAM_SIZE {
        Err(FramingError::MessageTooLarge(data.len(), MAX_DATAGRAM_SIZE))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::{ParticipantId, StateUpdate};
    use crate::net::protocol::{ClientMessage, ServerMessage};
    use crate::util::vec3::Vec3;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_write_message() {
        let data = b"Hello, World!";
        let mut buffer = Vec::new();

        write_message(&mut buffer, data).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await.unwrap();

        assert_eq!(result, data);
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let large_data = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let mut buffer = Vec::new();

        let result = write_message(&mut buffer, &large_data).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_le_bytes());

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let payload = b"split frame";
        let len = (payload.len() as u32).to_le_bytes();
        let mut stream = tokio_test::io::Builder::new()
            .read(&len[..2])
            .read(&len[2..])
            .read(&payload[..5])
            .read(&payload[5..])
            .build();

        let result = read_message(&mut stream).await.unwrap();
        assert_eq!(result, payload);
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_le_bytes());
        buffer.extend_from_slice(&[1, 2, 3]);

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_typed_messages_in_sequence() {
        let mut buffer = Vec::new();
        send(&mut buffer, &ClientMessage::CreateLobby { map_name: "test".to_string() })
            .await
            .unwrap();
        send(&mut buffer, &ClientMessage::PlayerUpdate(StateUpdate::at(Vec3::UP)))
            .await
            .unwrap();

        let mut cursor = Cursor::new(buffer);
        let first: ClientMessage = recv(&mut cursor).await.unwrap();
        let second: ClientMessage = recv(&mut cursor).await.unwrap();
        assert_eq!(first.kind(), "createLobby");
        assert_eq!(second, ClientMessage::PlayerUpdate(StateUpdate::at(Vec3::UP)));

        let end: Result<ClientMessage, _> = recv(&mut cursor).await;
        assert!(matches!(end, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_undecodable_frame_skipped() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &[0xff, 0xff, 0xff, 0xff]).await.unwrap();
        send(&mut buffer, &ServerMessage::Welcome { id: ParticipantId::from("a") })
            .await
            .unwrap();

        let mut cursor = Cursor::new(buffer);
        let bad: Result<ServerMessage, _> = recv(&mut cursor).await;
        assert!(matches!(bad, Err(FramingError::Decode(_))));

        let good: ServerMessage = recv(&mut cursor).await.unwrap();
        assert_eq!(good.kind(), "welcome");
    }

    #[test]
    fn test_validate_datagram_size() {
        assert!(validate_datagram_size(&[0u8; 100]).is_ok());
        assert!(validate_datagram_size(&vec![0u8; MAX_DATAGRAM_SIZE + 1]).is_err());
    }
}
