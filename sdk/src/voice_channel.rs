//! Voice-channel runtime: codec negotiation, packet dispatch, and the
//! cipher plumbing for the datagram path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use mumble_protocol::{AudioPacket, CodecType, ControlMessage, Target, VoicePacket};

use crate::codec::{AudioCodec, CodecRegistry, VoiceCrypto};
use crate::control_channel::OutboundCmd;
use crate::error::ClientError;
use crate::event::Event;
use crate::store::ServerState;

/// Largest datagram the voice socket will accept.
const DATAGRAM_BUFFER_SIZE: usize = 2048;

/// Negotiated codec instances plus the outgoing choice.
///
/// Incoming dispatch is always per-packet by type byte; the preference
/// from codec negotiation only ever selects the encoder.
#[derive(Default)]
struct CodecBank {
    incoming: HashMap<CodecType, Box<dyn AudioCodec>>,
    outgoing: Option<CodecType>,
}

/// Where outgoing voice datagrams go.
pub(crate) enum VoiceOutgoing {
    /// Wrapped as UDP-tunnel messages on the control stream.
    Tunnel(mpsc::UnboundedSender<OutboundCmd>),
    /// Handed to the datagram socket task, through the cipher.
    Udp(mpsc::UnboundedSender<Vec<u8>>),
}

pub(crate) struct VoiceChannel {
    registry: CodecRegistry,
    codecs: Mutex<CodecBank>,
    crypto: Mutex<Box<dyn VoiceCrypto>>,
    events: async_channel::Sender<Event>,
    outgoing: VoiceOutgoing,
    state: Arc<RwLock<ServerState>>,
    sequence: AtomicU64,
}

impl VoiceChannel {
    pub(crate) fn new(
        registry: CodecRegistry,
        crypto: Box<dyn VoiceCrypto>,
        events: async_channel::Sender<Event>,
        outgoing: VoiceOutgoing,
        state: Arc<RwLock<ServerState>>,
    ) -> Self {
        Self {
            registry,
            codecs: Mutex::new(CodecBank::default()),
            crypto: Mutex::new(crypto),
            events,
            outgoing,
            state,
            sequence: AtomicU64::new(0),
        }
    }

    /// Applies a codec-version message.
    ///
    /// Each non-zero bitstream id is resolved against the registry; the
    /// preferred side becomes the encoder for outgoing audio.
    ///
    /// # Errors
    /// An asserted Opus flag, an unregistered bitstream version, or a
    /// preference pointing at an unconfigured codec are configuration
    /// errors fatal to the session.
    pub(crate) fn configure_codecs(
        &self,
        alpha: i32,
        beta: i32,
        prefer_alpha: bool,
        opus: bool,
    ) -> Result<(), ClientError> {
        if opus {
            return Err(ClientError::OpusNotSupported);
        }

        let mut bank = self.codecs.lock().expect("codec bank poisoned");

        #[allow(clippy::cast_sign_loss)]
        for (bitstream, slot) in [
            (alpha as u32, CodecType::CeltAlpha),
            (beta as u32, CodecType::CeltBeta),
        ] {
            if bitstream == 0 {
                continue;
            }
            let codec = self
                .registry
                .instantiate(bitstream)
                .ok_or(ClientError::UnknownBitstream(bitstream))?;
            bank.incoming.insert(slot, codec);
            debug!("codec {:?} bound to bitstream {:#010x}", slot, bitstream);
        }

        let preferred = if prefer_alpha {
            CodecType::CeltAlpha
        } else {
            CodecType::CeltBeta
        };
        if !bank.incoming.contains_key(&preferred) {
            return Err(ClientError::NoOutgoingCodec);
        }
        bank.outgoing = Some(preferred);
        Ok(())
    }

    /// Stores cipher key material from a crypt-setup message.
    pub(crate) fn setup_crypt(&self, key: &[u8], client_nonce: &[u8], server_nonce: &[u8]) {
        self.crypto
            .lock()
            .expect("crypto poisoned")
            .set_key(key, client_nonce, server_nonce);
        debug!("voice crypt material installed");
    }

    /// Entry point for raw datagrams off the socket.
    pub(crate) async fn handle_datagram(&self, data: &[u8]) {
        let plain = self.crypto.lock().expect("crypto poisoned").decrypt(data);
        match plain {
            Some(plain) => self.handle_plaintext(&plain).await,
            None => warn!("voice datagram failed authentication; dropped"),
        }
    }

    /// Entry point for packets that arrive already in the clear, i.e.
    /// tunneled through the control stream.
    pub(crate) async fn handle_plaintext(&self, data: &[u8]) {
        match VoicePacket::parse(data) {
            Err(err) => warn!("undecodable voice packet dropped: {err}"),
            Ok(VoicePacket::Ping { timestamp }) => {
                debug!("voice ping {} echoed", timestamp);
                if let Err(err) = self.send_datagram(data.to_vec()).await {
                    warn!("voice ping echo failed: {err}");
                }
            }
            Ok(VoicePacket::Audio(audio)) => self.dispatch_audio(audio).await,
        }
    }

    async fn dispatch_audio(&self, audio: AudioPacket) {
        let decoded: Vec<Vec<i16>> = {
            let mut bank = self.codecs.lock().expect("codec bank poisoned");
            let Some(codec) = bank.incoming.get_mut(&audio.codec) else {
                warn!("no codec for voice packet type {:?}; dropped", audio.codec);
                return;
            };
            audio
                .frames
                .iter()
                .filter_map(|frame| match codec.decode(frame) {
                    Ok(pcm) => Some(pcm),
                    Err(err) => {
                        warn!("audio frame dropped: {err}");
                        None
                    }
                })
                .collect()
        };

        for pcm in decoded {
            let _ = self
                .events
                .send(Event::VoiceReceived {
                    session: audio.session,
                    target: audio.target,
                    pcm,
                })
                .await;
        }
    }

    /// Encodes one PCM frame with the negotiated outgoing codec and
    /// ships it as ordinary speech.
    pub(crate) async fn send_audio(&self, pcm: &[i16]) -> Result<(), ClientError> {
        let session = self
            .state
            .read()
            .await
            .session()
            .ok_or(ClientError::NotSynced)?;

        let (codec_type, frame) = {
            let mut bank = self.codecs.lock().expect("codec bank poisoned");
            let codec_type = bank.outgoing.ok_or(ClientError::NoOutgoingCodec)?;
            let codec = bank
                .incoming
                .get_mut(&codec_type)
                .ok_or(ClientError::NoOutgoingCodec)?;
            (codec_type, codec.encode(pcm)?)
        };

        let packet = AudioPacket {
            codec: codec_type,
            target: Target::Normal,
            session: u64::from(session),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            frames: vec![frame],
            end_of_transmission: false,
        };
        self.send_datagram(packet.encode()).await
    }

    async fn send_datagram(&self, datagram: Vec<u8>) -> Result<(), ClientError> {
        match &self.outgoing {
            VoiceOutgoing::Tunnel(control) => control
                .send(OutboundCmd::Message(ControlMessage::UdpTunnel(datagram)))
                .map_err(|_| ClientError::Disconnected),
            VoiceOutgoing::Udp(socket) => {
                let cipher = self
                    .crypto
                    .lock()
                    .expect("crypto poisoned")
                    .encrypt(&datagram);
                socket.send(cipher).map_err(|_| ClientError::Disconnected)
            }
        }
    }
}

/// Runs the datagram socket: outgoing ciphertext one way, incoming
/// datagrams into the dispatcher the other.
pub(crate) fn spawn_udp(
    channel: Arc<VoiceChannel>,
    socket: UdpSocket,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    tokio::spawn(async move {
        let mut buf = [0u8; DATAGRAM_BUFFER_SIZE];
        loop {
            tokio::select! {
                datagram = outgoing.recv() => {
                    let Some(datagram) = datagram else { break };
                    if let Err(err) = socket.send(&datagram).await {
                        warn!("voice send error: {err}");
                        break;
                    }
                }
                result = socket.recv(&mut buf) => {
                    match result {
                        Ok(n) => channel.handle_datagram(&buf[..n]).await,
                        Err(err) => {
                            warn!("voice receive error: {err}");
                            break;
                        }
                    }
                }
            }
        }
        debug!("voice socket handler stopped");
    });
}
