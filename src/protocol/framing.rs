//! Frame reassembly over a byte stream.
//!
//! TCP delivers bytes, not frames. A reader first waits for the full
//! two-byte header, then for exactly the declared number of payload bytes,
//! so a frame split across any number of segments comes out whole and the
//! next frame's bytes stay in the stream.

use super::codec::{HEADER_LEN, Header};
use super::message::{Message, MessageError};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{instrument, trace};

/// One complete frame read off the wire, not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header.
    pub header: Header,
    /// Exactly `header.len` bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Interprets the frame as a typed message.
    pub fn message(&self) -> Result<Message, MessageError> {
        Message::from_parts(self.header, &self.payload)
    }
}

/// Reads the next complete frame.
///
/// Any I/O failure, including EOF mid-frame, is returned as-is; callers
/// treat every error as the peer going away.
#[instrument(level = "trace", skip(reader))]
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let header = Header::from_bytes(header);

    let mut payload = vec![0u8; usize::from(header.len)];
    reader.read_exact(&mut payload).await?;

    trace!(kind = header.kind, len = header.len, "Frame received");
    Ok(Frame { header, payload })
}

/// Encodes and writes one message, flushing afterwards.
#[instrument(level = "trace", skip(writer))]
pub async fn write_message<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message
        .to_bytes()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}
