//! Frame codec for call streams.
//!
//! # Wire format
//!
//! ```text
//! FRAME: [1 byte: kind][4 bytes BE: payload_len][payload_len bytes: JSON payload]
//!
//! kind 0x01 CALL     client -> server, first frame: {"method": "..."}
//! kind 0x02 MESSAGE  either direction: one typed message
//! kind 0x03 END      end-of-stream for the writer's direction (empty payload)
//! kind 0x04 STATUS   server -> client, terminal error: {"code": "...", "message": "..."}
//! ```

use filestream_protocol::constants::MAX_FRAME_SIZE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Frame kind: call header.
pub const FRAME_CALL: u8 = 0x01;

/// Frame kind: message.
pub const FRAME_MESSAGE: u8 = 0x02;

/// Frame kind: end-of-stream.
pub const FRAME_END: u8 = 0x03;

/// Frame kind: terminal status.
pub const FRAME_STATUS: u8 = 0x04;

/// Length of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 5;

/// Kind of a frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Call,
    Message,
    End,
    Status,
}

impl FrameKind {
    /// Parses the kind byte. Returns `None` for unknown kinds.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            FRAME_CALL => Some(Self::Call),
            FRAME_MESSAGE => Some(Self::Message),
            FRAME_END => Some(Self::End),
            FRAME_STATUS => Some(Self::Status),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Call => FRAME_CALL,
            Self::Message => FRAME_MESSAGE,
            Self::End => FRAME_END,
            Self::Status => FRAME_STATUS,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Deserializes the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Writes one frame and flushes.
///
/// Header and payload go out in a single write so a frame is never
/// interleaved with a concurrent writer's bytes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    kind: FrameKind,
    payload: &[u8],
) -> Result<(), TransportError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.push(kind.as_byte());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Serializes `value` as JSON and writes it as one frame.
pub async fn write_json_frame<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    kind: FrameKind,
    value: &T,
) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, kind, &payload).await
}

/// Reads one frame.
///
/// Returns `None` if the peer closed the connection cleanly on a frame
/// boundary. EOF inside a frame is an I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Frame>, TransportError> {
    let mut kind = [0u8; 1];
    if reader.read(&mut kind).await? == 0 {
        return Ok(None);
    }
    let kind = FrameKind::from_byte(kind[0]).ok_or_else(|| {
        TransportError::Protocol(format!("unknown frame kind 0x{:02x}", kind[0]))
    })?;

    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame { kind, payload }))
}
