//! Wire-format layer for the Mumble 1.2.4 protocol.
//!
//! Covers both transports: the reliable control channel (a framed stream
//! of protobuf messages) and the unreliable voice channel (varint-packed
//! datagrams multiplexing several audio codecs). This crate is pure
//! encode/decode; sockets and session state live in `mumble-sdk`.

pub mod control;
pub mod error;
pub mod framing;
pub mod messages;
pub mod varint;
pub mod voice;

pub use control::{ControlMessage, UDP_TUNNEL_TYPE_ID};
pub use error::ProtocolError;
pub use framing::{ControlCodec, ControlFrame};
pub use voice::{AudioPacket, CodecType, Target, VoicePacket};
