//! Client configuration and protocol constants.

use std::time::Duration;

/// Protocol release this client speaks.
pub const MUMBLE_VERSION: (u8, u8, u8) = (1, 2, 4);

/// Default server port, shared by the control and voice channels.
pub const DEFAULT_PORT: u16 = 64738;

/// Keepalive cadence on the control channel.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Packs a release triple into the wire encoding,
/// `major << 16 | minor << 8 | patch`.
#[must_use]
pub fn pack_version(major: u8, minor: u8, patch: u8) -> u32 {
    u32::from(major) << 16 | u32::from(minor) << 8 | u32::from(patch)
}

/// Connection parameters for [`crate::MumbleClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    /// Control-channel keepalive interval. Overridable for tests.
    pub ping_interval: Duration,
    /// When set, voice runs over its own datagram socket; otherwise it
    /// is tunneled through the control stream.
    pub use_udp: bool,
}

impl ClientConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            use_udp: false,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn with_udp_voice(mut self, use_udp: bool) -> Self {
        self.use_udp = use_udp;
        self
    }
}
