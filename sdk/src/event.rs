//! Application-visible events.

use mumble_protocol::messages::permission_denied::DenyType;
use mumble_protocol::messages::reject::RejectType;
use mumble_protocol::Target;

use crate::entities::{Channel, User};

/// Destination of a text message, from the receiver's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTarget {
    User { session: u32 },
    Channel { channel_id: u32 },
}

/// Everything the client surfaces to the application.
///
/// Entity-carrying variants hold snapshots taken at the moment the
/// triggering message was applied.
#[derive(Debug, Clone)]
pub enum Event {
    /// The server finished its initial sync; the session is usable.
    Ready {
        session: Option<u32>,
        welcome_text: Option<String>,
    },
    ChannelAdded {
        channel: Channel,
    },
    ChannelUpdated {
        channel: Channel,
    },
    ChannelRemoved {
        channel: Channel,
    },
    UserConnected {
        user: User,
    },
    UserUpdated {
        user: User,
    },
    /// A known user changed channels. Fired in addition to
    /// [`Event::UserUpdated`].
    UserMoved {
        user: User,
        from: Option<Channel>,
        to: Option<Channel>,
    },
    UserDisconnected {
        user: User,
    },
    /// One event per destination the message was addressed to.
    TextMessage {
        origin: Option<User>,
        target: TextTarget,
        body: String,
    },
    /// One decoded audio frame from the voice channel.
    VoiceReceived {
        session: u64,
        target: Target,
        pcm: Vec<i16>,
    },
    /// The server refused the session during the handshake. Surfaced,
    /// not thrown; the server will close the stream on its own.
    Rejected {
        reject_type: Option<RejectType>,
        reason: Option<String>,
    },
    PermissionDenied {
        deny_type: Option<DenyType>,
        channel_id: Option<u32>,
        reason: Option<String>,
    },
    /// The control connection is gone; no events follow this one.
    Disconnected,
}
