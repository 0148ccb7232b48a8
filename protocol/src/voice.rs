//! Voice-channel packet codec.
//!
//! One datagram per packet. The first byte packs the codec type into its
//! top 3 bits and the routing target into its low 5 bits; everything
//! after it is varint-coded. Ping packets carry only a timestamp and are
//! echoed back by clients as the datagram-path keepalive.

use crate::error::ProtocolError;
use crate::varint;

/// Largest frame a non-Opus packet can carry: the per-frame header keeps
/// the length in 7 bits.
pub const MAX_LEGACY_FRAME_LEN: usize = 0x7f;

/// Largest Opus frame: 13 length bits in the audio header.
pub const MAX_OPUS_FRAME_LEN: usize = 0x1fff;

/// Audio codec selector from the packet header's top 3 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    CeltAlpha,
    Ping,
    Speex,
    CeltBeta,
    Opus,
}

impl CodecType {
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::CeltAlpha),
            1 => Some(Self::Ping),
            2 => Some(Self::Speex),
            3 => Some(Self::CeltBeta),
            4 => Some(Self::Opus),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_bits(self) -> u8 {
        match self {
            Self::CeltAlpha => 0,
            Self::Ping => 1,
            Self::Speex => 2,
            Self::CeltBeta => 3,
            Self::Opus => 4,
        }
    }
}

/// Routing selector from the packet header's low 5 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Ordinary speech into the current channel.
    Normal,
    /// One of the 30 numbered whisper/shout target slots.
    Whisper(u8),
    /// Echoed back to the sender by the server.
    ServerLoopback,
}

impl Target {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x1f {
            0 => Self::Normal,
            31 => Self::ServerLoopback,
            slot => Self::Whisper(slot),
        }
    }

    #[must_use]
    pub fn to_bits(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::ServerLoopback => 31,
            Self::Whisper(slot) => slot & 0x1f,
        }
    }
}

/// A parsed voice-channel datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoicePacket {
    /// Datagram keepalive; carries no audio.
    Ping { timestamp: u64 },
    Audio(AudioPacket),
}

/// An audio-bearing voice packet.
///
/// `sequence` is carried through as parsed; this layer attaches no
/// ordering or loss semantics to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    pub codec: CodecType,
    pub target: Target,
    pub session: u64,
    pub sequence: u64,
    /// Compressed frames, in wire order. Empty terminator frames are not
    /// retained.
    pub frames: Vec<Vec<u8>>,
    /// True when the sender marked this packet as the end of a
    /// transmission.
    pub end_of_transmission: bool,
}

fn non_negative(value: i128) -> Result<u64, ProtocolError> {
    u64::try_from(value).map_err(|_| ProtocolError::MalformedVoicePacket)
}

impl VoicePacket {
    /// Parses one datagram.
    ///
    /// Bytes after the last audio frame (positional-audio trailer) are
    /// tolerated and ignored.
    ///
    /// # Errors
    /// [`ProtocolError::MalformedVoicePacket`] for an empty buffer, an
    /// undefined codec type, or a negative varint in a count position;
    /// [`ProtocolError::Truncated`] when the buffer ends inside a field.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let header = *data.first().ok_or(ProtocolError::MalformedVoicePacket)?;
        let codec =
            CodecType::from_bits(header >> 5).ok_or(ProtocolError::MalformedVoicePacket)?;
        let target = Target::from_bits(header & 0x1f);
        let mut rest = &data[1..];

        if codec == CodecType::Ping {
            let (timestamp, _) = varint::decode(rest)?;
            return Ok(Self::Ping {
                timestamp: non_negative(timestamp)?,
            });
        }

        let (session, used) = varint::decode(rest)?;
        rest = &rest[used..];
        let (sequence, used) = varint::decode(rest)?;
        rest = &rest[used..];

        let mut frames = Vec::new();
        let mut end_of_transmission = false;

        if codec == CodecType::Opus {
            let (audio_header, used) = varint::decode(rest)?;
            rest = &rest[used..];
            let audio_header = non_negative(audio_header)?;
            let length = usize::try_from(audio_header & 0x1fff)
                .map_err(|_| ProtocolError::MalformedVoicePacket)?;
            end_of_transmission = audio_header >> 13 & 1 == 1;
            if rest.len() < length {
                return Err(ProtocolError::Truncated {
                    needed: length,
                    remaining: rest.len(),
                });
            }
            if length > 0 {
                frames.push(rest[..length].to_vec());
            }
        } else {
            loop {
                let frame_header = *rest.first().ok_or(ProtocolError::Truncated {
                    needed: 1,
                    remaining: 0,
                })?;
                rest = &rest[1..];
                let length = usize::from(frame_header & 0x7f);
                let more_frames = frame_header & 0x80 != 0;
                if rest.len() < length {
                    return Err(ProtocolError::Truncated {
                        needed: length,
                        remaining: rest.len(),
                    });
                }
                if length == 0 {
                    end_of_transmission = true;
                } else {
                    frames.push(rest[..length].to_vec());
                }
                rest = &rest[length..];
                if !more_frames {
                    break;
                }
            }
        }

        Ok(Self::Audio(AudioPacket {
            codec,
            target,
            session: non_negative(session)?,
            sequence: non_negative(sequence)?,
            frames,
            end_of_transmission,
        }))
    }

    /// Serializes the packet into a fresh datagram buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ping { timestamp } => {
                let mut out = vec![CodecType::Ping.to_bits() << 5];
                varint::encode(i128::from(*timestamp), &mut out);
                out
            }
            Self::Audio(packet) => packet.encode(),
        }
    }
}

impl AudioPacket {
    /// Serializes the packet.
    ///
    /// A packet with no frames encodes as a bare terminator and parses
    /// back with `end_of_transmission` set.
    ///
    /// # Panics
    /// Panics if a frame exceeds its codec's length field
    /// ([`MAX_OPUS_FRAME_LEN`] / [`MAX_LEGACY_FRAME_LEN`]), or if the
    /// codec is [`CodecType::Ping`].
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.codec != CodecType::Ping, "ping packets carry no audio");

        let mut out = vec![self.codec.to_bits() << 5 | self.target.to_bits()];
        varint::encode(i128::from(self.session), &mut out);
        varint::encode(i128::from(self.sequence), &mut out);

        if self.codec == CodecType::Opus {
            let frame = self.frames.first().map_or(&[][..], Vec::as_slice);
            assert!(frame.len() <= MAX_OPUS_FRAME_LEN, "opus frame too long");
            let mut audio_header = frame.len() as u64;
            if self.end_of_transmission {
                audio_header |= 1 << 13;
            }
            varint::encode(i128::from(audio_header), &mut out);
            out.extend_from_slice(frame);
        } else {
            for (index, frame) in self.frames.iter().enumerate() {
                assert!(
                    !frame.is_empty() && frame.len() <= MAX_LEGACY_FRAME_LEN,
                    "frame length must be 1..=127"
                );
                let last = index + 1 == self.frames.len();
                let more_frames = !last || self.end_of_transmission;
                #[allow(clippy::cast_possible_truncation)]
                out.push(u8::from(more_frames) << 7 | frame.len() as u8);
                out.extend_from_slice(frame);
            }
            if self.end_of_transmission || self.frames.is_empty() {
                out.push(0x00);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_celt_frame() {
        // type=CELT-alpha target=normal, session 1, sequence 1, one
        // 5-byte frame without a continuation flag.
        let mut data = vec![0x00, 0x01, 0x01, 0x05];
        data.extend_from_slice(&[0xaa; 5]);

        let packet = VoicePacket::parse(&data).unwrap();
        let VoicePacket::Audio(audio) = packet else {
            panic!("expected audio packet");
        };
        assert_eq!(audio.codec, CodecType::CeltAlpha);
        assert_eq!(audio.target, Target::Normal);
        assert_eq!(audio.session, 1);
        assert_eq!(audio.sequence, 1);
        assert_eq!(audio.frames, vec![vec![0xaa; 5]]);
        assert!(!audio.end_of_transmission);
    }

    #[test]
    fn parse_multi_frame_celt() {
        let data = [
            0x60 | 0x02, // CELT-beta, whisper slot 2
            0x04,        // session
            0x09,        // sequence
            0x82,        // frame 1: more=1, len=2
            0x11,
            0x22,
            0x01, // frame 2: more=0, len=1
            0x33,
        ];
        let VoicePacket::Audio(audio) = VoicePacket::parse(&data).unwrap() else {
            panic!("expected audio packet");
        };
        assert_eq!(audio.codec, CodecType::CeltBeta);
        assert_eq!(audio.target, Target::Whisper(2));
        assert_eq!(audio.frames, vec![vec![0x11, 0x22], vec![0x33]]);
        assert!(!audio.end_of_transmission);
    }

    #[test]
    fn zero_length_frame_terminates_transmission() {
        let data = [0x00, 0x01, 0x02, 0x81, 0x7e, 0x00];
        let VoicePacket::Audio(audio) = VoicePacket::parse(&data).unwrap() else {
            panic!("expected audio packet");
        };
        assert_eq!(audio.frames, vec![vec![0x7e]]);
        assert!(audio.end_of_transmission);
    }

    #[test]
    fn roundtrip_celt_packets() {
        for end_of_transmission in [false, true] {
            let packet = AudioPacket {
                codec: CodecType::CeltAlpha,
                target: Target::Normal,
                session: 300,
                sequence: 17_000,
                frames: vec![vec![1; 40], vec![2; 40], vec![3; 12]],
                end_of_transmission,
            };
            let decoded = VoicePacket::parse(&packet.encode()).unwrap();
            assert_eq!(decoded, VoicePacket::Audio(packet));
        }
    }

    #[test]
    fn roundtrip_opus_packet() {
        let packet = AudioPacket {
            codec: CodecType::Opus,
            target: Target::ServerLoopback,
            session: 77,
            sequence: 2,
            frames: vec![vec![0x55; 900]],
            end_of_transmission: true,
        };
        let encoded = packet.encode();
        let decoded = VoicePacket::parse(&encoded).unwrap();
        assert_eq!(decoded, VoicePacket::Audio(packet));
    }

    #[test]
    fn roundtrip_ping() {
        let packet = VoicePacket::Ping {
            timestamp: 1_700_000_000,
        };
        assert_eq!(VoicePacket::parse(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn positional_trailer_is_ignored() {
        let mut data = vec![0x00, 0x01, 0x01, 0x02, 0xaa, 0xbb];
        data.extend_from_slice(&[0x3f; 12]); // position floats
        let VoicePacket::Audio(audio) = VoicePacket::parse(&data).unwrap() else {
            panic!("expected audio packet");
        };
        assert_eq!(audio.frames, vec![vec![0xaa, 0xbb]]);
    }

    #[test]
    fn undefined_codec_type_is_rejected() {
        let err = VoicePacket::parse(&[0xa0, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedVoicePacket));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let err = VoicePacket::parse(&[0x00, 0x01, 0x01, 0x05, 0xaa]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                needed: 5,
                remaining: 1
            }
        ));
    }

    #[test]
    fn whisper_targets_survive_the_header() {
        for slot in 1..=30 {
            let bits = Target::Whisper(slot).to_bits();
            assert_eq!(Target::from_bits(bits), Target::Whisper(slot));
        }
        assert_eq!(Target::from_bits(0), Target::Normal);
        assert_eq!(Target::from_bits(31), Target::ServerLoopback);
    }
}
