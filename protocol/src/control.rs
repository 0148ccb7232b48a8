//! Control-channel message registry.
//!
//! Maps the 26 wire type ids of protocol 1.2.4 onto a closed tagged
//! union. The mapping here is the single source of truth for dispatch
//! and encoding; a type id it does not know is a protocol violation.

use prost::Message;

use crate::error::ProtocolError;
use crate::messages;

/// Wire type id of the UDP-tunnel passthrough frame, whose payload is a
/// raw voice-channel packet rather than a structured message.
pub const UDP_TUNNEL_TYPE_ID: u16 = 1;

/// A decoded control-channel message, tagged with its wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Version(messages::Version),
    /// Voice-channel packet tunneled over the reliable stream, carried
    /// verbatim.
    UdpTunnel(Vec<u8>),
    Authenticate(messages::Authenticate),
    Ping(messages::Ping),
    Reject(messages::Reject),
    ServerSync(messages::ServerSync),
    ChannelRemove(messages::ChannelRemove),
    ChannelState(messages::ChannelState),
    UserRemove(messages::UserRemove),
    UserState(messages::UserState),
    BanList(messages::BanList),
    TextMessage(messages::TextMessage),
    PermissionDenied(messages::PermissionDenied),
    Acl(messages::Acl),
    QueryUsers(messages::QueryUsers),
    CryptSetup(messages::CryptSetup),
    ContextActionModify(messages::ContextActionModify),
    ContextAction(messages::ContextAction),
    UserList(messages::UserList),
    VoiceTarget(messages::VoiceTarget),
    PermissionQuery(messages::PermissionQuery),
    CodecVersion(messages::CodecVersion),
    UserStats(messages::UserStats),
    RequestBlob(messages::RequestBlob),
    ServerConfig(messages::ServerConfig),
    SuggestConfig(messages::SuggestConfig),
}

macro_rules! registry {
    ($($id:literal = $variant:ident),* $(,)?) => {
        impl ControlMessage {
            /// Returns the wire type id for this message.
            #[must_use]
            pub fn type_id(&self) -> u16 {
                match self {
                    Self::UdpTunnel(_) => UDP_TUNNEL_TYPE_ID,
                    $(Self::$variant(_) => $id,)*
                }
            }

            /// Short message name, for logging.
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    Self::UdpTunnel(_) => "UdpTunnel",
                    $(Self::$variant(_) => stringify!($variant),)*
                }
            }

            /// Decodes a frame payload according to its declared type id.
            ///
            /// # Errors
            /// [`ProtocolError::UnknownMessageType`] if the id is outside
            /// the registry, [`ProtocolError::Payload`] if the payload
            /// does not parse as the promised message.
            pub fn decode(type_id: u16, payload: &[u8]) -> Result<Self, ProtocolError> {
                match type_id {
                    UDP_TUNNEL_TYPE_ID => Ok(Self::UdpTunnel(payload.to_vec())),
                    $($id => Ok(Self::$variant(messages::$variant::decode(payload)?)),)*
                    unknown => Err(ProtocolError::UnknownMessageType(unknown)),
                }
            }

            /// Serializes the message payload, without the envelope header.
            #[must_use]
            pub fn encode_payload(&self) -> Vec<u8> {
                match self {
                    Self::UdpTunnel(raw) => raw.clone(),
                    $(Self::$variant(message) => message.encode_to_vec(),)*
                }
            }
        }

        $(
            impl From<messages::$variant> for ControlMessage {
                fn from(message: messages::$variant) -> Self {
                    Self::$variant(message)
                }
            }
        )*
    };
}

registry! {
    0 = Version,
    2 = Authenticate,
    3 = Ping,
    4 = Reject,
    5 = ServerSync,
    6 = ChannelRemove,
    7 = ChannelState,
    8 = UserRemove,
    9 = UserState,
    10 = BanList,
    11 = TextMessage,
    12 = PermissionDenied,
    13 = Acl,
    14 = QueryUsers,
    15 = CryptSetup,
    16 = ContextActionModify,
    17 = ContextAction,
    18 = UserList,
    19 = VoiceTarget,
    20 = PermissionQuery,
    21 = CodecVersion,
    22 = UserStats,
    23 = RequestBlob,
    24 = ServerConfig,
    25 = SuggestConfig,
}
