//! Typed protocol messages.
//!
//! Each [`Message`] variant owns an explicit payload layout. Encoding writes
//! the payload byte by byte and decoding validates size and value ranges
//! before building the variant.

use super::codec::{self, CodecError, Header};
use derive_more::{Display, Error};
use strictly_tictactoe::{Board, Player, Square};
use tracing::instrument;

/// Message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, strum::EnumIter)]
#[repr(u8)]
pub enum MessageType {
    /// Post-connect greeting carrying the assigned player id.
    Welcome = 1,
    /// Server has no free slot.
    ServerFull = 2,
    /// Full board snapshot.
    BoardUpdate = 3,
    /// Whose move is expected.
    Turn = 4,
    /// Outcome of the sender's move request.
    MoveResult = 5,
    /// Terminal: a player won.
    Win = 6,
    /// Terminal: draw.
    Draw = 7,
    /// Human-readable diagnostic.
    Error = 8,
    /// Client asks to mark a cell.
    MoveRequest = 100,
    /// Client is leaving.
    QuitRequest = 101,
}

impl MessageType {
    /// Wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        use MessageType::*;
        Some(match tag {
            1 => Welcome,
            2 => ServerFull,
            3 => BoardUpdate,
            4 => Turn,
            5 => MoveResult,
            6 => Win,
            7 => Draw,
            8 => Error,
            100 => MoveRequest,
            101 => QuitRequest,
            _ => return None,
        })
    }

    /// Payload size for fixed-size types, `None` for variable-length text.
    pub fn payload_len(self) -> Option<usize> {
        use MessageType::*;
        match self {
            ServerFull | Draw | QuitRequest => Some(0),
            Welcome | Turn | MoveResult | Win | MoveRequest => Some(1),
            BoardUpdate => Some(Board::SIZE),
            Error => None,
        }
    }
}

/// Outcome carried by [`Message::MoveResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MoveStatus {
    /// Move applied.
    #[display("accepted")]
    Accepted,
    /// Move refused; the sender must try again.
    #[display("rejected")]
    Rejected,
}

impl MoveStatus {
    fn to_byte(self) -> u8 {
        match self {
            MoveStatus::Accepted => 0,
            MoveStatus::Rejected => 1,
        }
    }

    fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(MoveStatus::Accepted),
            1 => Some(MoveStatus::Rejected),
            _ => None,
        }
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Assigned identity.
    Welcome(Player),
    /// No free slot.
    ServerFull,
    /// Board snapshot.
    BoardUpdate(Board),
    /// Active player.
    Turn(Player),
    /// Outcome of a move request.
    MoveResult(MoveStatus),
    /// Winner.
    Win(Player),
    /// Draw.
    Draw,
    /// Diagnostic text.
    Error(String),
    /// Requested cell index. Range is checked by the game, not the codec.
    MoveRequest(u8),
    /// Voluntary disconnect.
    QuitRequest,
}

/// Failures turning a frame into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum MessageError {
    /// Frame-level failure.
    #[display("{source}")]
    Codec {
        /// Underlying codec error.
        source: CodecError,
    },
    /// Type byte is not a known message type.
    #[display("Unknown message type {tag}")]
    UnknownType {
        /// Offending tag.
        tag: u8,
    },
    /// Payload size does not match the type's layout.
    #[display("Malformed {kind} payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        /// Message type.
        kind: MessageType,
        /// Size required by the layout.
        expected: usize,
        /// Size received.
        actual: usize,
    },
    /// Player id outside 1..=2.
    #[display("Invalid player id {id}")]
    InvalidPlayer {
        /// Offending id.
        id: u8,
    },
    /// Cell value outside 0..=2.
    #[display("Invalid square value {value} at {pos}")]
    InvalidSquare {
        /// Board index.
        pos: usize,
        /// Offending value.
        value: u8,
    },
    /// Move status outside 0..=1.
    #[display("Invalid move status {value}")]
    InvalidStatus {
        /// Offending value.
        value: u8,
    },
}

impl From<CodecError> for MessageError {
    fn from(source: CodecError) -> Self {
        Self::Codec { source }
    }
}

impl Message {
    /// Builds an error message, truncating the text to fit one frame.
    pub fn error(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if text.len() > codec::MAX_PAYLOAD_LEN {
            let mut end = codec::MAX_PAYLOAD_LEN;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        Message::Error(text)
    }

    /// Type tag of this message.
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Welcome(_) => MessageType::Welcome,
            Message::ServerFull => MessageType::ServerFull,
            Message::BoardUpdate(_) => MessageType::BoardUpdate,
            Message::Turn(_) => MessageType::Turn,
            Message::MoveResult(_) => MessageType::MoveResult,
            Message::Win(_) => MessageType::Win,
            Message::Draw => MessageType::Draw,
            Message::Error(_) => MessageType::Error,
            Message::MoveRequest(_) => MessageType::MoveRequest,
            Message::QuitRequest => MessageType::QuitRequest,
        }
    }

    /// Payload bytes in wire layout.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Message::Welcome(player) | Message::Turn(player) | Message::Win(player) => {
                vec![player.id()]
            }
            Message::BoardUpdate(board) => board.squares().iter().map(|s| s.to_byte()).collect(),
            Message::MoveResult(status) => vec![status.to_byte()],
            Message::Error(text) => text.as_bytes().to_vec(),
            Message::MoveRequest(pos) => vec![*pos],
            Message::ServerFull | Message::Draw | Message::QuitRequest => Vec::new(),
        }
    }

    /// Encodes header and payload into `out`, replacing its contents.
    #[instrument(skip(out), fields(kind = %self.kind()))]
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        codec::encode(self.kind().tag(), &self.payload(), out)
    }

    /// Encodes into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Builds a message from a decoded header and its payload.
    #[instrument(skip(payload))]
    pub fn from_parts(header: Header, payload: &[u8]) -> Result<Self, MessageError> {
        let kind = MessageType::from_tag(header.kind)
            .ok_or(MessageError::UnknownType { tag: header.kind })?;

        if let Some(expected) = kind.payload_len()
            && payload.len() != expected
        {
            return Err(MessageError::MalformedPayload {
                kind,
                expected,
                actual: payload.len(),
            });
        }

        let player = |id: u8| Player::from_id(id).ok_or(MessageError::InvalidPlayer { id });

        Ok(match kind {
            MessageType::Welcome => Message::Welcome(player(payload[0])?),
            MessageType::ServerFull => Message::ServerFull,
            MessageType::BoardUpdate => {
                let mut squares = [Square::Empty; Board::SIZE];
                for (pos, (slot, &value)) in squares.iter_mut().zip(payload).enumerate() {
                    *slot = Square::from_byte(value)
                        .ok_or(MessageError::InvalidSquare { pos, value })?;
                }
                Message::BoardUpdate(Board::from_squares(squares))
            }
            MessageType::Turn => Message::Turn(player(payload[0])?),
            MessageType::MoveResult => Message::MoveResult(
                MoveStatus::from_byte(payload[0])
                    .ok_or(MessageError::InvalidStatus { value: payload[0] })?,
            ),
            MessageType::Win => Message::Win(player(payload[0])?),
            MessageType::Draw => Message::Draw,
            MessageType::Error => Message::Error(String::from_utf8_lossy(payload).into_owned()),
            MessageType::MoveRequest => Message::MoveRequest(payload[0]),
            MessageType::QuitRequest => Message::QuitRequest,
        })
    }

    /// Decodes one message from the front of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let (header, payload) = codec::decode(bytes)?;
        Self::from_parts(header, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn sample(kind: MessageType) -> Message {
        let mut board = Board::new();
        board.set(0, Square::Occupied(Player::X)).unwrap();
        board.set(8, Square::Occupied(Player::O)).unwrap();
        match kind {
            MessageType::Welcome => Message::Welcome(Player::O),
            MessageType::ServerFull => Message::ServerFull,
            MessageType::BoardUpdate => Message::BoardUpdate(board),
            MessageType::Turn => Message::Turn(Player::X),
            MessageType::MoveResult => Message::MoveResult(MoveStatus::Rejected),
            MessageType::Win => Message::Win(Player::O),
            MessageType::Draw => Message::Draw,
            MessageType::Error => Message::error("Not your turn"),
            MessageType::MoveRequest => Message::MoveRequest(7),
            MessageType::QuitRequest => Message::QuitRequest,
        }
    }

    #[test]
    fn test_every_type_roundtrips() {
        for kind in MessageType::iter() {
            let message = sample(kind);
            assert_eq!(message.kind(), kind);
            let bytes = message.to_bytes().unwrap();
            assert_eq!(bytes[0], kind.tag());
            assert_eq!(Message::decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn test_tags_match_wire_table() {
        let tags: Vec<u8> = MessageType::iter().map(MessageType::tag).collect();
        assert_eq!(tags, vec![1, 2, 3, 4, 5, 6, 7, 8, 100, 101]);
        for kind in MessageType::iter() {
            assert_eq!(MessageType::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(MessageType::from_tag(0), None);
        assert_eq!(MessageType::from_tag(9), None);
    }

    #[test]
    fn test_board_update_layout() {
        let bytes = sample(MessageType::BoardUpdate).to_bytes().unwrap();
        assert_eq!(bytes, vec![3, 9, 1, 0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            Message::decode(&[42, 0]),
            Err(MessageError::UnknownType { tag: 42 })
        );
    }

    #[test]
    fn test_short_move_request_is_malformed() {
        assert_eq!(
            Message::decode(&[100, 0]),
            Err(MessageError::MalformedPayload {
                kind: MessageType::MoveRequest,
                expected: 1,
                actual: 0,
            })
        );
    }

    #[test]
    fn test_out_of_range_values() {
        assert_eq!(
            Message::decode(&[1, 1, 3]),
            Err(MessageError::InvalidPlayer { id: 3 })
        );
        assert_eq!(
            Message::decode(&[5, 1, 2]),
            Err(MessageError::InvalidStatus { value: 2 })
        );
        assert_eq!(
            Message::decode(&[3, 9, 0, 0, 0, 0, 7, 0, 0, 0, 0]),
            Err(MessageError::InvalidSquare { pos: 4, value: 7 })
        );
    }

    #[test]
    fn test_codec_errors_surface() {
        assert_eq!(
            Message::decode(&[4]),
            Err(MessageError::Codec {
                source: CodecError::BufferTooSmall { len: 1 }
            })
        );
        assert_eq!(
            Message::decode(&[4, 1]),
            Err(MessageError::Codec {
                source: CodecError::SizeMismatch { expected: 3, actual: 2 }
            })
        );
    }

    #[test]
    fn test_error_text_truncated_on_char_boundary() {
        let long = "é".repeat(200);
        let Message::Error(text) = Message::error(long) else {
            panic!("expected error message");
        };
        assert!(text.len() <= codec::MAX_PAYLOAD_LEN);
        assert_eq!(text.len(), 254);
        assert!(Message::Error(text).to_bytes().is_ok());
    }

    #[test]
    fn test_oversized_error_text_rejected_by_encoder() {
        let message = Message::Error("x".repeat(256));
        assert_eq!(
            message.to_bytes(),
            Err(CodecError::PayloadTooLarge { len: 256 })
        );
    }
}
