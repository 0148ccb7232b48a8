//! Control-channel message schema, Mumble protocol 1.2.4.
//!
//! Hand-written `prost` structs matching the stable proto2 layout. Field
//! presence maps to `Option<T>`, which is what the state-merge layer keys
//! on: a field the server did not send stays `None` and must not disturb
//! the mirrored value.

/// Version exchange. Sent by both ends immediately after connecting.
///
/// `version` packs the release as `major << 16 | minor << 8 | patch`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    #[prost(uint32, optional, tag = "1")]
    pub version: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub release: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub os: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub os_version: Option<String>,
}

/// Client credentials, sent once right after [`Version`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Authenticate {
    #[prost(string, optional, tag = "1")]
    pub username: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub password: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub tokens: Vec<String>,
    #[prost(int32, repeated, packed = "false", tag = "4")]
    pub celt_versions: Vec<i32>,
    #[prost(bool, optional, tag = "5")]
    pub opus: Option<bool>,
}

/// Keepalive and link-quality statistics.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    #[prost(uint32, optional, tag = "2")]
    pub good: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub late: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub lost: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub resync: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub udp_packets: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub tcp_packets: Option<u32>,
    #[prost(float, optional, tag = "8")]
    pub udp_ping_avg: Option<f32>,
    #[prost(float, optional, tag = "9")]
    pub udp_ping_var: Option<f32>,
    #[prost(float, optional, tag = "10")]
    pub tcp_ping_avg: Option<f32>,
    #[prost(float, optional, tag = "11")]
    pub tcp_ping_var: Option<f32>,
}

/// Server refused the connection during the handshake.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Reject {
    #[prost(enumeration = "reject::RejectType", optional, tag = "1")]
    pub reject_type: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub reason: Option<String>,
}

pub mod reject {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum RejectType {
        None = 0,
        WrongVersion = 1,
        InvalidUsername = 2,
        WrongUserPw = 3,
        WrongServerPw = 4,
        UsernameInUse = 5,
        ServerFull = 6,
        NoCertificate = 7,
        AuthenticatorFail = 8,
    }
}

/// End of the initial state dump; carries the client's own session id.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerSync {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub max_bandwidth: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub welcome_text: Option<String>,
    #[prost(uint64, optional, tag = "4")]
    pub permissions: Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelRemove {
    #[prost(uint32, required, tag = "1")]
    pub channel_id: u32,
}

/// Full or partial channel state. Absent fields leave the mirrored
/// channel untouched.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelState {
    #[prost(uint32, optional, tag = "1")]
    pub channel_id: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub parent: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(uint32, repeated, packed = "false", tag = "4")]
    pub links: Vec<u32>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(uint32, repeated, packed = "false", tag = "6")]
    pub links_add: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "7")]
    pub links_remove: Vec<u32>,
    #[prost(bool, optional, tag = "8")]
    pub temporary: Option<bool>,
    #[prost(int32, optional, tag = "9")]
    pub position: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "10")]
    pub description_hash: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserRemove {
    #[prost(uint32, required, tag = "1")]
    pub session: u32,
    #[prost(uint32, optional, tag = "2")]
    pub actor: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub reason: Option<String>,
    #[prost(bool, optional, tag = "4")]
    pub ban: Option<bool>,
}

/// Full or partial user state. Absent fields leave the mirrored user
/// untouched.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserState {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub actor: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    pub user_id: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub channel_id: Option<u32>,
    #[prost(bool, optional, tag = "6")]
    pub mute: Option<bool>,
    #[prost(bool, optional, tag = "7")]
    pub deaf: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub suppress: Option<bool>,
    #[prost(bool, optional, tag = "9")]
    pub self_mute: Option<bool>,
    #[prost(bool, optional, tag = "10")]
    pub self_deaf: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "11")]
    pub texture: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "12")]
    pub plugin_context: Option<Vec<u8>>,
    #[prost(string, optional, tag = "13")]
    pub plugin_identity: Option<String>,
    #[prost(string, optional, tag = "14")]
    pub comment: Option<String>,
    #[prost(string, optional, tag = "15")]
    pub hash: Option<String>,
    #[prost(bytes = "vec", optional, tag = "16")]
    pub comment_hash: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "17")]
    pub texture_hash: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "18")]
    pub priority_speaker: Option<bool>,
    #[prost(bool, optional, tag = "19")]
    pub recording: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BanList {
    #[prost(message, repeated, tag = "1")]
    pub bans: Vec<ban_list::BanEntry>,
    #[prost(bool, optional, tag = "2")]
    pub query: Option<bool>,
}

pub mod ban_list {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BanEntry {
        #[prost(bytes = "vec", required, tag = "1")]
        pub address: Vec<u8>,
        #[prost(uint32, required, tag = "2")]
        pub mask: u32,
        #[prost(string, optional, tag = "3")]
        pub name: Option<String>,
        #[prost(string, optional, tag = "4")]
        pub hash: Option<String>,
        #[prost(string, optional, tag = "5")]
        pub reason: Option<String>,
        #[prost(string, optional, tag = "6")]
        pub start: Option<String>,
        #[prost(uint32, optional, tag = "7")]
        pub duration: Option<u32>,
    }
}

/// Chat text addressed to any mix of users, channels, and channel trees.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextMessage {
    #[prost(uint32, optional, tag = "1")]
    pub actor: Option<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "2")]
    pub session: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "3")]
    pub channel_id: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "4")]
    pub tree_id: Vec<u32>,
    #[prost(string, required, tag = "5")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PermissionDenied {
    #[prost(uint32, optional, tag = "1")]
    pub permission: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub channel_id: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub session: Option<u32>,
    #[prost(string, optional, tag = "4")]
    pub reason: Option<String>,
    #[prost(enumeration = "permission_denied::DenyType", optional, tag = "5")]
    pub deny_type: Option<i32>,
    #[prost(string, optional, tag = "6")]
    pub name: Option<String>,
}

pub mod permission_denied {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum DenyType {
        Text = 0,
        Permission = 1,
        SuperUser = 2,
        ChannelName = 3,
        TextTooLong = 4,
        H9K = 5,
        TemporaryChannel = 6,
        MissingCertificate = 7,
        UserName = 8,
        ChannelFull = 9,
        NestingLimit = 10,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Acl {
    #[prost(uint32, required, tag = "1")]
    pub channel_id: u32,
    #[prost(bool, optional, tag = "2", default = "true")]
    pub inherit_acls: Option<bool>,
    #[prost(message, repeated, tag = "3")]
    pub groups: Vec<acl::ChanGroup>,
    #[prost(message, repeated, tag = "4")]
    pub acls: Vec<acl::ChanAcl>,
    #[prost(bool, optional, tag = "5")]
    pub query: Option<bool>,
}

pub mod acl {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChanGroup {
        #[prost(string, required, tag = "1")]
        pub name: String,
        #[prost(bool, optional, tag = "2", default = "true")]
        pub inherited: Option<bool>,
        #[prost(bool, optional, tag = "3", default = "true")]
        pub inherit: Option<bool>,
        #[prost(bool, optional, tag = "4", default = "true")]
        pub inheritable: Option<bool>,
        #[prost(uint32, repeated, packed = "false", tag = "5")]
        pub add: Vec<u32>,
        #[prost(uint32, repeated, packed = "false", tag = "6")]
        pub remove: Vec<u32>,
        #[prost(uint32, repeated, packed = "false", tag = "7")]
        pub inherited_members: Vec<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChanAcl {
        #[prost(bool, optional, tag = "1", default = "true")]
        pub apply_here: Option<bool>,
        #[prost(bool, optional, tag = "2", default = "true")]
        pub apply_subs: Option<bool>,
        #[prost(bool, optional, tag = "3", default = "true")]
        pub inherited: Option<bool>,
        #[prost(uint32, optional, tag = "4")]
        pub user_id: Option<u32>,
        #[prost(string, optional, tag = "5")]
        pub group: Option<String>,
        #[prost(uint32, optional, tag = "6")]
        pub grant: Option<u32>,
        #[prost(uint32, optional, tag = "7")]
        pub deny: Option<u32>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryUsers {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub ids: Vec<u32>,
    #[prost(string, repeated, tag = "2")]
    pub names: Vec<String>,
}

/// Key material for the voice-channel cipher. The payload cipher itself
/// lives behind the sdk's crypto boundary.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CryptSetup {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub client_nonce: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub server_nonce: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContextActionModify {
    #[prost(string, required, tag = "1")]
    pub action: String,
    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
    #[prost(uint32, optional, tag = "3")]
    pub context: Option<u32>,
    #[prost(enumeration = "context_action_modify::Operation", optional, tag = "4")]
    pub operation: Option<i32>,
}

pub mod context_action_modify {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Operation {
        Add = 0,
        Remove = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContextAction {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub channel_id: Option<u32>,
    #[prost(string, required, tag = "3")]
    pub action: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserList {
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<user_list::User>,
}

pub mod user_list {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct User {
        #[prost(uint32, required, tag = "1")]
        pub user_id: u32,
        #[prost(string, optional, tag = "2")]
        pub name: Option<String>,
        #[prost(string, optional, tag = "3")]
        pub last_seen: Option<String>,
        #[prost(uint32, optional, tag = "4")]
        pub last_channel: Option<u32>,
    }
}

/// Whisper/shout target definition, bound to one of the 1..=30 target slots.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VoiceTarget {
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    #[prost(message, repeated, tag = "2")]
    pub targets: Vec<voice_target::Target>,
}

pub mod voice_target {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Target {
        #[prost(uint32, repeated, packed = "false", tag = "1")]
        pub session: Vec<u32>,
        #[prost(uint32, optional, tag = "2")]
        pub channel_id: Option<u32>,
        #[prost(string, optional, tag = "3")]
        pub group: Option<String>,
        #[prost(bool, optional, tag = "4")]
        pub links: Option<bool>,
        #[prost(bool, optional, tag = "5")]
        pub children: Option<bool>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PermissionQuery {
    #[prost(uint32, optional, tag = "1")]
    pub channel_id: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub permissions: Option<u32>,
    #[prost(bool, optional, tag = "3")]
    pub flush: Option<bool>,
}

/// Negotiated CELT bitstream versions and the server's encoder preference.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CodecVersion {
    #[prost(int32, required, tag = "1")]
    pub alpha: i32,
    #[prost(int32, required, tag = "2")]
    pub beta: i32,
    #[prost(bool, required, tag = "3", default = "true")]
    pub prefer_alpha: bool,
    #[prost(bool, optional, tag = "4")]
    pub opus: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserStats {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub stats_only: Option<bool>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub certificates: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "4")]
    pub from_client: Option<user_stats::Stats>,
    #[prost(message, optional, tag = "5")]
    pub to_client: Option<user_stats::Stats>,
    #[prost(message, optional, tag = "6")]
    pub version: Option<Version>,
    #[prost(int32, repeated, packed = "false", tag = "7")]
    pub celt_versions: Vec<i32>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub address: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "9")]
    pub bandwidth: Option<u32>,
    #[prost(uint32, optional, tag = "10")]
    pub onlinesecs: Option<u32>,
    #[prost(uint32, optional, tag = "11")]
    pub idlesecs: Option<u32>,
    #[prost(bool, optional, tag = "12")]
    pub strong_certificate: Option<bool>,
    #[prost(bool, optional, tag = "13")]
    pub opus: Option<bool>,
}

pub mod user_stats {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Stats {
        #[prost(uint32, optional, tag = "1")]
        pub good: Option<u32>,
        #[prost(uint32, optional, tag = "2")]
        pub late: Option<u32>,
        #[prost(uint32, optional, tag = "3")]
        pub lost: Option<u32>,
        #[prost(uint32, optional, tag = "4")]
        pub resync: Option<u32>,
    }
}

/// Asks the server to stream large attachments (textures, comments,
/// channel descriptions) the client only knows by hash.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestBlob {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub session_texture: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "2")]
    pub session_comment: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "3")]
    pub channel_description: Vec<u32>,
}

/// Server limits; receipt of this message is the readiness signal for a
/// freshly authenticated session.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerConfig {
    #[prost(uint32, optional, tag = "1")]
    pub max_bandwidth: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub welcome_text: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub allow_html: Option<bool>,
    #[prost(uint32, optional, tag = "4")]
    pub message_length: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub image_message_length: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SuggestConfig {
    #[prost(uint32, optional, tag = "1")]
    pub version: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub positional: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub push_to_talk: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn roundtrip<M: Message + PartialEq + Default>(message: &M) {
        let encoded = message.encode_to_vec();
        let decoded = M::decode(encoded.as_slice()).expect("decode failed");
        assert_eq!(*message, decoded);
    }

    #[test]
    fn roundtrip_version() {
        roundtrip(&Version {
            version: Some(1 << 16 | 2 << 8 | 4),
            release: Some("1.2.4".to_string()),
            os: Some("Linux".to_string()),
            os_version: None,
        });
    }

    #[test]
    fn roundtrip_channel_state_partial() {
        roundtrip(&ChannelState {
            channel_id: Some(3),
            position: Some(2),
            ..ChannelState::default()
        });
    }

    #[test]
    fn roundtrip_user_state_full() {
        roundtrip(&UserState {
            session: Some(17),
            name: Some("alice".to_string()),
            user_id: Some(4),
            channel_id: Some(3),
            mute: Some(false),
            self_deaf: Some(true),
            hash: Some("ab".repeat(20)),
            comment_hash: Some(vec![0xde, 0xad, 0xbe, 0xef]),
            priority_speaker: Some(true),
            ..UserState::default()
        });
    }

    #[test]
    fn roundtrip_text_message_destinations() {
        roundtrip(&TextMessage {
            actor: Some(17),
            session: vec![1, 2],
            channel_id: vec![0],
            tree_id: vec![5],
            message: "hello".to_string(),
        });
    }

    #[test]
    fn roundtrip_ban_list() {
        roundtrip(&BanList {
            bans: vec![ban_list::BanEntry {
                address: vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 10, 0, 0, 1],
                mask: 128,
                name: Some("spammer".to_string()),
                reason: Some("flood".to_string()),
                ..ban_list::BanEntry::default()
            }],
            query: Some(false),
        });
    }

    #[test]
    fn roundtrip_acl_groups() {
        roundtrip(&Acl {
            channel_id: 2,
            inherit_acls: Some(false),
            groups: vec![acl::ChanGroup {
                name: "admin".to_string(),
                add: vec![4],
                ..acl::ChanGroup::default()
            }],
            acls: vec![acl::ChanAcl {
                apply_here: Some(true),
                group: Some("admin".to_string()),
                grant: Some(0x1f),
                ..acl::ChanAcl::default()
            }],
            query: None,
        });
    }

    #[test]
    fn roundtrip_user_stats_nested() {
        roundtrip(&UserStats {
            session: Some(9),
            from_client: Some(user_stats::Stats {
                good: Some(100),
                lost: Some(2),
                ..user_stats::Stats::default()
            }),
            version: Some(Version {
                version: Some(0x0001_0204),
                ..Version::default()
            }),
            celt_versions: vec![-2_147_483_637, -2_147_483_632],
            ..UserStats::default()
        });
    }

    #[test]
    fn codec_version_defaults() {
        let message = CodecVersion::default();
        assert!(message.prefer_alpha);
        roundtrip(&CodecVersion {
            alpha: -2_147_483_637,
            beta: 0,
            prefer_alpha: true,
            opus: Some(false),
        });
    }
}
