//! Error types for the wire-format layer.

use thiserror::Error;

/// Errors produced while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A control frame declared a type id outside the message registry.
    /// The byte stream cannot be trusted past this point.
    #[error("unknown control message type: {0}")]
    UnknownMessageType(u16),

    /// A control frame declared a payload larger than the configured limit.
    #[error("control frame of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { length: usize, limit: usize },

    /// A voice packet ended before the advertised field or frame was complete.
    #[error("voice packet truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    /// A voice packet was empty, carried an undefined codec type, or
    /// spelled a negative value where only counts are meaningful.
    #[error("malformed voice packet")]
    MalformedVoicePacket,

    /// A control payload did not parse as the message its type id promised.
    #[error("malformed message payload: {0}")]
    Payload(#[from] prost::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
