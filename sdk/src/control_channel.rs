//! Control-channel runtime: handshake, keepalive, and message dispatch.
//!
//! One task per connection owns the stream. It pushes the version and
//! authenticate messages, then settles into a select loop over the ping
//! timer, the outgoing queue, and inbound bytes. Readiness is implicit
//! in this protocol: there is no auth-succeeded message, the first
//! server-config marks the session established.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Notify, RwLock};
use tokio::time::{interval_at, Instant};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, warn};

use mumble_protocol::messages::permission_denied::DenyType;
use mumble_protocol::messages::reject::RejectType;
use mumble_protocol::{messages, ControlCodec, ControlFrame, ControlMessage};

use crate::config::{pack_version, MUMBLE_VERSION};
use crate::error::ClientError;
use crate::event::{Event, TextTarget};
use crate::store::ServerState;
use crate::voice_channel::VoiceChannel;

/// Lifecycle of one control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    VersionSent,
    Authenticating,
    Established,
    Closed,
}

/// Work for the connection task.
pub(crate) enum OutboundCmd {
    Message(ControlMessage),
    Shutdown,
}

/// Everything the connection task needs from the rest of the client.
pub(crate) struct ControlContext {
    pub state: Arc<RwLock<ServerState>>,
    pub store_changed: Arc<Notify>,
    pub events: async_channel::Sender<Event>,
    pub voice: Arc<VoiceChannel>,
    pub username: String,
    pub password: Option<String>,
    pub ping_interval: Duration,
    pub celt_versions: Vec<i32>,
}

/// Cheap handle for talking to the connection task.
pub(crate) struct ControlHandle {
    tx: mpsc::UnboundedSender<OutboundCmd>,
    phase: watch::Receiver<ConnectionPhase>,
}

impl ControlHandle {
    pub(crate) fn send(&self, message: ControlMessage) -> Result<(), ClientError> {
        self.tx
            .send(OutboundCmd::Message(message))
            .map_err(|_| ClientError::Disconnected)
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(OutboundCmd::Shutdown);
    }

    pub(crate) fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }
}

pub(crate) fn spawn<S>(
    stream: S,
    ctx: ControlContext,
    tx: mpsc::UnboundedSender<OutboundCmd>,
    rx: mpsc::UnboundedReceiver<OutboundCmd>,
) -> ControlHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (phase_tx, phase_rx) = watch::channel(ConnectionPhase::Connecting);
    tokio::spawn(run(stream, ctx, rx, phase_tx));
    ControlHandle { tx, phase: phase_rx }
}

async fn run<S>(
    stream: S,
    ctx: ControlContext,
    mut outgoing: mpsc::UnboundedReceiver<OutboundCmd>,
    phase: watch::Sender<ConnectionPhase>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut codec = ControlCodec::new();
    let mut handler = MessageHandler { ctx, phase };

    let close_reason = match drive(
        &mut reader,
        &mut writer,
        &mut codec,
        &mut handler,
        &mut outgoing,
    )
    .await
    {
        Ok(reason) => reason.to_string(),
        Err(err) => {
            error!("control channel failed: {err}");
            err.to_string()
        }
    };

    handler.set_phase(ConnectionPhase::Closed);
    // Wake blob waiters so they observe the closed phase.
    handler.ctx.store_changed.notify_waiters();
    let _ = handler.ctx.events.send(Event::Disconnected).await;
    debug!("control handler stopped: {close_reason}");
}

async fn drive<R, W>(
    reader: &mut R,
    writer: &mut W,
    codec: &mut ControlCodec,
    handler: &mut MessageHandler,
    outgoing: &mut mpsc::UnboundedReceiver<OutboundCmd>,
) -> Result<&'static str, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_message(writer, codec, &handler.version_message()).await?;
    handler.set_phase(ConnectionPhase::VersionSent);
    write_message(writer, codec, &handler.authenticate_message()).await?;
    handler.set_phase(ConnectionPhase::Authenticating);

    let interval = handler.ctx.ping_interval;
    let mut ping = interval_at(Instant::now() + interval, interval);
    let mut read_buf = BytesMut::with_capacity(8 * 1024);

    loop {
        tokio::select! {
            _ = ping.tick() => {
                let message = ControlMessage::Ping(messages::Ping {
                    timestamp: Some(epoch_seconds()),
                    ..messages::Ping::default()
                });
                write_message(writer, codec, &message).await?;
            }
            command = outgoing.recv() => match command {
                Some(OutboundCmd::Message(message)) => {
                    write_message(writer, codec, &message).await?;
                }
                Some(OutboundCmd::Shutdown) | None => return Ok("closed by client"),
            },
            read = reader.read_buf(&mut read_buf) => {
                if read? == 0 {
                    return Ok("server closed the connection");
                }
                // A framing or registry error here poisons the stream;
                // there is no resynchronization, only teardown.
                while let Some(frame) = codec.decode(&mut read_buf)? {
                    handler.handle_frame(frame).await?;
                }
            }
        }
    }
}

async fn write_message<W>(
    writer: &mut W,
    codec: &mut ControlCodec,
    message: &ControlMessage,
) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    codec.encode(message, &mut buf)?;
    writer.write_all(&buf).await?;
    debug!("--> {}", message.name());
    Ok(())
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

struct MessageHandler {
    ctx: ControlContext,
    phase: watch::Sender<ConnectionPhase>,
}

impl MessageHandler {
    fn set_phase(&self, phase: ConnectionPhase) {
        let _ = self.phase.send(phase);
    }

    fn version_message(&self) -> ControlMessage {
        let (major, minor, patch) = MUMBLE_VERSION;
        messages::Version {
            version: Some(pack_version(major, minor, patch)),
            release: Some(format!("{major}.{minor}.{patch}")),
            os: Some(std::env::consts::OS.to_string()),
            os_version: None,
        }
        .into()
    }

    fn authenticate_message(&self) -> ControlMessage {
        messages::Authenticate {
            username: Some(self.ctx.username.clone()),
            password: self.ctx.password.clone(),
            tokens: Vec::new(),
            celt_versions: self.ctx.celt_versions.clone(),
            opus: Some(false),
        }
        .into()
    }

    /// Dispatches one inbound frame.
    ///
    /// Errors poison the connection: an unregistered type id, an
    /// undecodable payload, or a codec configuration the session cannot
    /// continue under.
    async fn handle_frame(&mut self, frame: ControlFrame) -> Result<(), ClientError> {
        let message = ControlMessage::decode(frame.type_id, &frame.payload)?;
        debug!("<-- {}", message.name());

        match message {
            ControlMessage::ChannelState(state) => self.channel_state(&state).await,
            ControlMessage::ChannelRemove(remove) => self.channel_remove(remove.channel_id).await,
            ControlMessage::UserState(state) => self.user_state(&state).await,
            ControlMessage::UserRemove(remove) => self.user_remove(remove.session).await,
            ControlMessage::TextMessage(text) => self.text_message(&text).await,
            ControlMessage::CodecVersion(codec) => {
                self.ctx.voice.configure_codecs(
                    codec.alpha,
                    codec.beta,
                    codec.prefer_alpha,
                    codec.opus.unwrap_or(false),
                )?;
            }
            ControlMessage::CryptSetup(crypt) => {
                self.ctx.voice.setup_crypt(
                    crypt.key.as_deref().unwrap_or_default(),
                    crypt.client_nonce.as_deref().unwrap_or_default(),
                    crypt.server_nonce.as_deref().unwrap_or_default(),
                );
            }
            ControlMessage::UdpTunnel(packet) => {
                self.ctx.voice.handle_plaintext(&packet).await;
            }
            ControlMessage::ServerSync(sync) => {
                self.ctx.state.write().await.set_sync(
                    sync.session,
                    sync.welcome_text,
                    sync.max_bandwidth,
                );
                self.ctx.store_changed.notify_waiters();
            }
            ControlMessage::ServerConfig(_) => {
                if *self.phase.borrow() != ConnectionPhase::Established {
                    self.set_phase(ConnectionPhase::Established);
                    let (session, welcome_text) = {
                        let store = self.ctx.state.read().await;
                        (store.session(), store.welcome_text().map(str::to_string))
                    };
                    let _ = self
                        .ctx
                        .events
                        .send(Event::Ready {
                            session,
                            welcome_text,
                        })
                        .await;
                }
            }
            ControlMessage::Reject(reject) => {
                let _ = self
                    .ctx
                    .events
                    .send(Event::Rejected {
                        reject_type: reject
                            .reject_type
                            .and_then(|value| RejectType::try_from(value).ok()),
                        reason: reject.reason,
                    })
                    .await;
            }
            ControlMessage::PermissionDenied(denied) => {
                let _ = self
                    .ctx
                    .events
                    .send(Event::PermissionDenied {
                        deny_type: denied
                            .deny_type
                            .and_then(|value| DenyType::try_from(value).ok()),
                        channel_id: denied.channel_id,
                        reason: denied.reason,
                    })
                    .await;
            }
            ControlMessage::Ping(_) | ControlMessage::Version(_) => {}
            other => warn!("{} unhandled", other.name()),
        }
        Ok(())
    }

    async fn channel_state(&mut self, state: &messages::ChannelState) {
        let applied = self.ctx.state.write().await.apply_channel_state(state);
        self.ctx.store_changed.notify_waiters();
        if let Some(applied) = applied {
            let event = if applied.added {
                Event::ChannelAdded {
                    channel: applied.channel,
                }
            } else {
                Event::ChannelUpdated {
                    channel: applied.channel,
                }
            };
            let _ = self.ctx.events.send(event).await;
        }
    }

    async fn channel_remove(&mut self, channel_id: u32) {
        let removed = self.ctx.state.write().await.remove_channel(channel_id);
        self.ctx.store_changed.notify_waiters();
        match removed {
            Some(channel) => {
                let _ = self.ctx.events.send(Event::ChannelRemoved { channel }).await;
            }
            None => warn!("remove for unknown channel {}", channel_id),
        }
    }

    async fn user_state(&mut self, state: &messages::UserState) {
        let (applied, moved) = {
            let mut store = self.ctx.state.write().await;
            let applied = store.apply_user_state(state);
            let moved = applied.as_ref().and_then(|applied| {
                applied.moved_from.map(|from| {
                    (
                        store.channel(from).cloned(),
                        store.channel(applied.user.channel_id).cloned(),
                    )
                })
            });
            (applied, moved)
        };
        self.ctx.store_changed.notify_waiters();

        let Some(applied) = applied else { return };
        let event = if applied.added {
            Event::UserConnected {
                user: applied.user.clone(),
            }
        } else {
            Event::UserUpdated {
                user: applied.user.clone(),
            }
        };
        let _ = self.ctx.events.send(event).await;

        if let Some((from, to)) = moved {
            let _ = self
                .ctx
                .events
                .send(Event::UserMoved {
                    user: applied.user,
                    from,
                    to,
                })
                .await;
        }
    }

    async fn user_remove(&mut self, session: u32) {
        let removed = self.ctx.state.write().await.remove_user(session);
        self.ctx.store_changed.notify_waiters();
        match removed {
            Some(user) => {
                let _ = self.ctx.events.send(Event::UserDisconnected { user }).await;
            }
            None => warn!("remove for unknown user {}", session),
        }
    }

    async fn text_message(&mut self, text: &messages::TextMessage) {
        let origin = match text.actor {
            Some(actor) => {
                let origin = self.ctx.state.read().await.user(actor).cloned();
                if origin.is_none() {
                    warn!("text message from unknown actor {}", actor);
                }
                origin
            }
            None => None,
        };

        for session in &text.session {
            let _ = self
                .ctx
                .events
                .send(Event::TextMessage {
                    origin: origin.clone(),
                    target: TextTarget::User { session: *session },
                    body: text.message.clone(),
                })
                .await;
        }
        for channel_id in &text.channel_id {
            let _ = self
                .ctx
                .events
                .send(Event::TextMessage {
                    origin: origin.clone(),
                    target: TextTarget::Channel {
                        channel_id: *channel_id,
                    },
                    body: text.message.clone(),
                })
                .await;
        }
    }
}
