//! The session façade: one connection, one event stream, one mirrored
//! server state.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, Notify, RwLock, RwLockReadGuard};
use tracing::info;

use mumble_protocol::{messages, ControlMessage};

use crate::codec::{CodecRegistry, PlaintextCrypto, VoiceCrypto};
use crate::config::ClientConfig;
use crate::control_channel::{self, ConnectionPhase, ControlContext, ControlHandle};
use crate::entities::Blob;
use crate::error::ClientError;
use crate::event::{Event, TextTarget};
use crate::store::ServerState;
use crate::voice_channel::{self, VoiceChannel, VoiceOutgoing};

/// Pluggable boundaries for a new connection: the audio codec table and
/// the voice-payload cipher.
pub struct ConnectOptions {
    pub codecs: CodecRegistry,
    pub crypto: Box<dyn VoiceCrypto>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            codecs: CodecRegistry::new(),
            crypto: Box::new(PlaintextCrypto::default()),
        }
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("codecs", &self.codecs)
            .finish_non_exhaustive()
    }
}

/// Which blob a fetch is after.
#[derive(Clone, Copy)]
enum BlobKind {
    ChannelDescription(u32),
    UserComment(u32),
    UserTexture(u32),
}

/// A connected Mumble client.
///
/// Owns the connection tasks; state is read through [`Self::state`],
/// changes arrive on [`Self::events`].
pub struct MumbleClient {
    state: Arc<RwLock<ServerState>>,
    store_changed: Arc<Notify>,
    events: async_channel::Receiver<Event>,
    control: ControlHandle,
    voice: Arc<VoiceChannel>,
}

impl MumbleClient {
    /// Connects over plain TCP with default boundaries.
    ///
    /// # Errors
    /// Fails when the TCP (or, with UDP voice enabled, UDP) connection
    /// cannot be established.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        Self::connect_with(config, ConnectOptions::default()).await
    }

    /// Connects over plain TCP with caller-supplied codec and cipher
    /// boundaries.
    ///
    /// # Errors
    /// Fails when the TCP (or, with UDP voice enabled, UDP) connection
    /// cannot be established.
    pub async fn connect_with(
        config: ClientConfig,
        options: ConnectOptions,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        info!("control channel connected to {}:{}", config.host, config.port);

        let udp = if config.use_udp {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect((config.host.as_str(), config.port)).await?;
            info!("voice socket connected to {}:{}", config.host, config.port);
            Some(socket)
        } else {
            None
        };

        Ok(Self::start(&config, stream, udp, options))
    }

    /// Takes over an already-established stream, typically one the
    /// caller wrapped in TLS. Voice runs through the control-channel
    /// tunnel.
    pub fn connect_with_stream<S>(
        config: &ClientConfig,
        stream: S,
        options: ConnectOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::start(config, stream, None, options)
    }

    fn start<S>(
        config: &ClientConfig,
        stream: S,
        udp: Option<UdpSocket>,
        options: ConnectOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let state = Arc::new(RwLock::new(ServerState::default()));
        let store_changed = Arc::new(Notify::new());
        let (event_tx, event_rx) = async_channel::unbounded();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let (voice_outgoing, udp_parts) = match udp {
            Some(socket) => {
                let (udp_tx, udp_rx) = mpsc::unbounded_channel();
                (VoiceOutgoing::Udp(udp_tx), Some((socket, udp_rx)))
            }
            None => (VoiceOutgoing::Tunnel(outbound_tx.clone()), None),
        };

        #[allow(clippy::cast_possible_wrap)]
        let celt_versions: Vec<i32> = options
            .codecs
            .known_versions()
            .iter()
            .map(|version| *version as i32)
            .collect();

        let voice = Arc::new(VoiceChannel::new(
            options.codecs,
            options.crypto,
            event_tx.clone(),
            voice_outgoing,
            state.clone(),
        ));
        if let Some((socket, udp_rx)) = udp_parts {
            voice_channel::spawn_udp(voice.clone(), socket, udp_rx);
        }

        let ctx = ControlContext {
            state: state.clone(),
            store_changed: store_changed.clone(),
            events: event_tx,
            voice: voice.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            ping_interval: config.ping_interval,
            celt_versions,
        };
        let control = control_channel::spawn(stream, ctx, outbound_tx, outbound_rx);

        Self {
            state,
            store_changed,
            events: event_rx,
            control,
            voice,
        }
    }

    /// Stream of application-visible events. Clones share one queue.
    #[must_use]
    pub fn events(&self) -> async_channel::Receiver<Event> {
        self.events.clone()
    }

    /// Read access to the mirrored server state.
    pub async fn state(&self) -> RwLockReadGuard<'_, ServerState> {
        self.state.read().await
    }

    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.control.phase()
    }

    /// Tears the connection down. [`Event::Disconnected`] follows once
    /// the connection task has wound up.
    pub fn disconnect(&self) {
        self.control.shutdown();
    }

    /// Sends a chat message. For a channel target, `recursive` extends
    /// delivery to the whole subtree.
    ///
    /// # Errors
    /// [`ClientError::NotSynced`] before the server has assigned a
    /// session id, [`ClientError::Disconnected`] once the connection is
    /// gone.
    pub async fn send_text_message(
        &self,
        target: TextTarget,
        body: &str,
        recursive: bool,
    ) -> Result<(), ClientError> {
        let actor = self
            .state
            .read()
            .await
            .session()
            .ok_or(ClientError::NotSynced)?;

        let mut message = messages::TextMessage {
            actor: Some(actor),
            message: body.to_string(),
            ..messages::TextMessage::default()
        };
        match target {
            TextTarget::User { session } => message.session.push(session),
            TextTarget::Channel { channel_id } if recursive => message.tree_id.push(channel_id),
            TextTarget::Channel { channel_id } => message.channel_id.push(channel_id),
        }
        self.control.send(message.into())
    }

    /// Asks the server to move this client into `channel_id`.
    ///
    /// # Errors
    /// [`ClientError::UnknownChannel`] if the channel is not in the
    /// mirror, [`ClientError::NotSynced`] before sync,
    /// [`ClientError::Disconnected`] once the connection is gone.
    pub async fn join_channel(&self, channel_id: u32) -> Result<(), ClientError> {
        let session = {
            let store = self.state.read().await;
            store
                .channel(channel_id)
                .ok_or(ClientError::UnknownChannel(channel_id))?;
            store.session().ok_or(ClientError::NotSynced)?
        };

        self.control.send(
            messages::UserState {
                session: Some(session),
                actor: Some(session),
                channel_id: Some(channel_id),
                ..messages::UserState::default()
            }
            .into(),
        )
    }

    /// Encodes and sends one frame of PCM as ordinary speech.
    ///
    /// # Errors
    /// [`ClientError::NoOutgoingCodec`] before codec negotiation,
    /// [`ClientError::Codec`] if encoding fails,
    /// [`ClientError::Disconnected`] once the connection is gone.
    pub async fn send_audio(&self, pcm: &[i16]) -> Result<(), ClientError> {
        self.voice.send_audio(pcm).await
    }

    /// Escape hatch for registry messages without a dedicated helper.
    ///
    /// # Errors
    /// [`ClientError::Disconnected`] once the connection is gone.
    pub fn send_message(&self, message: ControlMessage) -> Result<(), ClientError> {
        self.control.send(message)
    }

    /// A channel's description, fetching it from the server on first
    /// access.
    ///
    /// # Errors
    /// [`ClientError::UnknownChannel`] if the channel disappears,
    /// [`ClientError::Disconnected`] if the connection closes first.
    pub async fn channel_description(&self, channel_id: u32) -> Result<Bytes, ClientError> {
        self.fetch_blob(BlobKind::ChannelDescription(channel_id)).await
    }

    /// A user's comment, fetching it from the server on first access.
    ///
    /// # Errors
    /// [`ClientError::UnknownUser`] if the user disconnects,
    /// [`ClientError::Disconnected`] if the connection closes first.
    pub async fn user_comment(&self, session: u32) -> Result<Bytes, ClientError> {
        self.fetch_blob(BlobKind::UserComment(session)).await
    }

    /// A user's avatar texture, fetching it from the server on first
    /// access.
    ///
    /// # Errors
    /// [`ClientError::UnknownUser`] if the user disconnects,
    /// [`ClientError::Disconnected`] if the connection closes first.
    pub async fn user_texture(&self, session: u32) -> Result<Bytes, ClientError> {
        self.fetch_blob(BlobKind::UserTexture(session)).await
    }

    /// Resolves one blob, issuing at most one request-blob round trip
    /// per advertised hash. If the hash changes midway the pending fetch
    /// is abandoned and a fresh request goes out for the new hash.
    async fn fetch_blob(&self, kind: BlobKind) -> Result<Bytes, ClientError> {
        loop {
            // Register for store changes before inspecting the blob, so an
            // update applied between the check and the await still wakes us.
            let notified = self.store_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let request = {
                let mut store = self.state.write().await;
                let blob = match kind {
                    BlobKind::ChannelDescription(id) => {
                        &mut store
                            .channel_mut(id)
                            .ok_or(ClientError::UnknownChannel(id))?
                            .description
                    }
                    BlobKind::UserComment(session) => {
                        &mut store
                            .user_mut(session)
                            .ok_or(ClientError::UnknownUser(session))?
                            .comment
                    }
                    BlobKind::UserTexture(session) => {
                        &mut store
                            .user_mut(session)
                            .ok_or(ClientError::UnknownUser(session))?
                            .texture
                    }
                };
                match blob {
                    Blob::Resolved { data, .. } => return Ok(data.clone()),
                    Blob::Empty => return Ok(Bytes::new()),
                    _ => blob.begin_fetch(),
                }
            };

            if request {
                let mut message = messages::RequestBlob::default();
                match kind {
                    BlobKind::ChannelDescription(id) => message.channel_description.push(id),
                    BlobKind::UserComment(session) => message.session_comment.push(session),
                    BlobKind::UserTexture(session) => message.session_texture.push(session),
                }
                self.control.send(message.into())?;
            }

            if self.control.phase() == ConnectionPhase::Closed {
                return Err(ClientError::Disconnected);
            }
            notified.await;
        }
    }
}
