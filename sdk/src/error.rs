//! Error types for the client.

use mumble_protocol::ProtocolError;
use thiserror::Error;

use crate::codec::CodecError;

/// Errors surfaced through the client API.
///
/// Server-side refusals (reject, permission denied) are not errors; they
/// arrive as structured [`crate::event::Event`]s and leave the
/// connection usable.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("disconnected from server")]
    Disconnected,

    #[error("unknown channel id {0}")]
    UnknownChannel(u32),

    #[error("unknown user session {0}")]
    UnknownUser(u32),

    /// The server has not sent its sync message yet, so the client does
    /// not know its own session id.
    #[error("session id not assigned yet")]
    NotSynced,

    /// The server demanded Opus, which cannot be negotiated here.
    #[error("server advertised Opus, which this client cannot negotiate")]
    OpusNotSupported,

    #[error("no codec registered for bitstream version {0:#010x}")]
    UnknownBitstream(u32),

    /// Codec negotiation never yielded an encoder for the outgoing side.
    #[error("no outgoing codec negotiated")]
    NoOutgoingCodec,

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
