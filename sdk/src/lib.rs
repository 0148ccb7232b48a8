//! Async client for the Mumble 1.2.4 voice-chat protocol.
//!
//! The client keeps a live mirror of the server's channel/user tree,
//! surfaces state changes and chat/audio as events, and multiplexes
//! voice either over its own datagram socket or tunneled through the
//! control stream. Audio codec math, TLS, and the voice-payload cipher
//! are host-supplied boundaries.

pub mod client;
pub mod codec;
pub mod config;
mod control_channel;
pub mod entities;
pub mod error;
pub mod event;
pub mod store;
mod voice_channel;

pub use client::{ConnectOptions, MumbleClient};
pub use codec::{
    AudioCodec, CodecError, CodecRegistry, PlaintextCrypto, VoiceCrypto, CELT_ALPHA_BITSTREAM,
    CELT_BETA_BITSTREAM, SAMPLE_RATE,
};
pub use config::ClientConfig;
pub use control_channel::ConnectionPhase;
pub use entities::{Blob, Channel, User};
pub use error::ClientError;
pub use event::{Event, TextTarget};
pub use store::ServerState;

pub use mumble_protocol as protocol;
