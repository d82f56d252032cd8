//! Binary wire protocol.
//!
//! - `codec`: two-byte header encode/decode over byte buffers
//! - `message`: typed messages with per-type payload layouts
//! - `framing`: async frame reads/writes over a byte stream

mod codec;
mod framing;
mod message;

pub use codec::{CodecError, HEADER_LEN, Header, MAX_PAYLOAD_LEN, decode, encode, encode_raw};
pub use framing::{Frame, read_frame, write_message};
pub use message::{Message, MessageError, MessageType, MoveStatus};
