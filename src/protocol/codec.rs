//! Two-byte-header frame codec.
//!
//! Every frame is `[type: u8][payload length: u8]` followed by exactly
//! `length` payload bytes. Both header fields are single bytes, so there is
//! no byte-order concern and the payload is capped at 255 bytes.
//!
//! This layer is untyped: it moves a type byte and an opaque payload. The
//! per-type payload layouts live in `message.rs`.

use derive_more::{Display, Error};
use tracing::instrument;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 2;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Frame header as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    /// Message type tag.
    pub kind: u8,
    /// Number of payload bytes following the header.
    pub len: u8,
}

impl Header {
    /// Parses a header from its two wire bytes.
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            kind: bytes[0],
            len: bytes[1],
        }
    }

    /// Wire representation.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        [self.kind, self.len]
    }

    /// Total frame size, header included.
    pub fn frame_len(self) -> usize {
        HEADER_LEN + usize::from(self.len)
    }
}

/// Failures of the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum CodecError {
    /// Payload longer than [`MAX_PAYLOAD_LEN`].
    #[display("Payload of {len} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit")]
    PayloadTooLarge {
        /// Requested payload length.
        len: usize,
    },
    /// No payload supplied although a nonzero length was requested.
    #[display("Missing payload for declared length {len}")]
    NullPayloadWithNonzeroLength {
        /// Requested payload length.
        len: usize,
    },
    /// Input shorter than a header.
    #[display("Buffer of {len} bytes is smaller than the {HEADER_LEN} byte header")]
    BufferTooSmall {
        /// Bytes available.
        len: usize,
    },
    /// Input shorter than header plus declared payload.
    #[display("Frame declares {expected} bytes but only {actual} are available")]
    SizeMismatch {
        /// Bytes required by the header.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// Payload slice shorter than the length requested from `encode_raw`.
    #[display("Payload of {available} bytes is shorter than the requested length {len}")]
    PayloadShorterThanLength {
        /// Requested payload length.
        len: usize,
        /// Bytes supplied.
        available: usize,
    },
}

/// Encodes a frame from a payload slice.
///
/// `out` is cleared first; on error it is left empty.
#[instrument(skip(payload, out), fields(len = payload.len()))]
pub fn encode(kind: u8, payload: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
    encode_raw(kind, Some(payload), payload.len(), out)
}

/// Encodes a frame from an optional payload and an explicit length.
///
/// This is the low-level form: `payload` may be absent only when `len` is
/// zero, and when present it must hold at least `len` bytes. Only the first
/// `len` bytes are written.
#[instrument(skip(payload, out))]
pub fn encode_raw(
    kind: u8,
    payload: Option<&[u8]>,
    len: usize,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    out.clear();

    if len > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge { len });
    }

    let body = match payload {
        Some(bytes) => bytes
            .get(..len)
            .ok_or(CodecError::PayloadShorterThanLength {
                len,
                available: bytes.len(),
            })?,
        None if len > 0 => return Err(CodecError::NullPayloadWithNonzeroLength { len }),
        None => &[],
    };

    // len <= 255 was checked above.
    let header = Header {
        kind,
        len: len as u8,
    };
    out.reserve(header.frame_len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(body);
    Ok(())
}

/// Decodes one frame from the front of `bytes`.
///
/// Returns the header and exactly `header.len` payload bytes. Anything after
/// the frame is left alone; stream framing is the caller's job.
#[instrument(skip(bytes), fields(available = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Result<(Header, &[u8]), CodecError> {
    let Some(&[kind, len]) = bytes.first_chunk::<HEADER_LEN>() else {
        return Err(CodecError::BufferTooSmall { len: bytes.len() });
    };
    let header = Header { kind, len };

    let payload = bytes
        .get(HEADER_LEN..header.frame_len())
        .ok_or(CodecError::SizeMismatch {
            expected: header.frame_len(),
            actual: bytes.len(),
        })?;

    Ok((header, payload))
}
