//! Control-channel envelope framing.
//!
//! Every message on the reliable stream is wrapped as
//! `[type id: u16 BE][payload length: u32 BE][payload]`. The decoder is
//! incremental: it can be fed arbitrary chunks, emits complete frames as
//! they become available, and keeps only unconsumed bytes buffered.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::ControlMessage;
use crate::error::ProtocolError;

/// Envelope header size: 2-byte type id plus 4-byte payload length.
pub const HEADER_LEN: usize = 6;

/// Default cap on a single payload. Real servers stay far below this;
/// anything larger means the stream is desynchronized.
pub const DEFAULT_MAX_PAYLOAD: usize = 8 * 1024 * 1024;

/// One framed unit off the wire: the declared type id and its payload.
///
/// Splitting framing from message decoding keeps the registry lookup
/// (and its fatal unknown-id error) at the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub type_id: u16,
    pub payload: Bytes,
}

/// Incremental encoder/decoder for the control envelope, usable directly
/// or through `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct ControlCodec {
    max_payload: usize,
}

impl ControlCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Overrides the payload cap, chiefly for tests.
    #[must_use]
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = ControlFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ControlFrame>, ProtocolError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let type_id = u16::from_be_bytes([src[0], src[1]]);
        let length = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;

        if length > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                length,
                limit: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + length {
            src.reserve(HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length).freeze();

        Ok(Some(ControlFrame { type_id, payload }))
    }
}

impl Encoder<&ControlMessage> for ControlCodec {
    type Error = ProtocolError;

    fn encode(
        &mut self,
        message: &ControlMessage,
        dst: &mut BytesMut,
    ) -> Result<(), ProtocolError> {
        let payload = message.encode_payload();
        if payload.len() > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                length: payload.len(),
                limit: self.max_payload,
            });
        }

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u16(message.type_id());
        dst.put_u32(u32::try_from(payload.len()).expect("payload cap fits in u32"));
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages;

    fn encode_all(messages: &[ControlMessage]) -> BytesMut {
        let mut codec = ControlCodec::new();
        let mut wire = BytesMut::new();
        for message in messages {
            codec.encode(message, &mut wire).expect("encode failed");
        }
        wire
    }

    fn sample_messages() -> Vec<ControlMessage> {
        vec![
            messages::Version {
                version: Some(0x0001_0204),
                release: Some("1.2.4".to_string()),
                os: Some("Linux".to_string()),
                os_version: None,
            }
            .into(),
            messages::Ping {
                timestamp: Some(1_700_000_000),
                ..messages::Ping::default()
            }
            .into(),
            messages::TextMessage {
                actor: Some(3),
                channel_id: vec![0],
                message: "hi".to_string(),
                ..messages::TextMessage::default()
            }
            .into(),
            messages::UserStats {
                session: Some(9),
                from_client: Some(messages::user_stats::Stats {
                    good: Some(11),
                    ..messages::user_stats::Stats::default()
                }),
                ..messages::UserStats::default()
            }
            .into(),
            messages::BanList {
                bans: vec![messages::ban_list::BanEntry {
                    address: vec![10, 0, 0, 1],
                    mask: 32,
                    ..messages::ban_list::BanEntry::default()
                }],
                query: None,
            }
            .into(),
            ControlMessage::UdpTunnel(vec![0x20, 0x01, 0x00, 0x00]),
        ]
    }

    #[test]
    fn frames_decode_back_to_the_same_messages() {
        let messages = sample_messages();
        let mut wire = encode_all(&messages);

        let mut codec = ControlCodec::new();
        for expected in &messages {
            let frame = codec.decode(&mut wire).unwrap().expect("missing frame");
            assert_eq!(frame.type_id, expected.type_id());
            let decoded = ControlMessage::decode(frame.type_id, &frame.payload).unwrap();
            assert_eq!(&decoded, expected);
        }
        assert!(wire.is_empty());
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn any_chunking_yields_the_same_frames() {
        let messages = sample_messages();
        let wire = encode_all(&messages);

        // Split the stream at every possible byte boundary.
        for split in 0..=wire.len() {
            let mut codec = ControlCodec::new();
            let mut buffer = BytesMut::new();
            let mut frames = Vec::new();

            for chunk in [&wire[..split], &wire[split..]] {
                buffer.extend_from_slice(chunk);
                while let Some(frame) = codec.decode(&mut buffer).unwrap() {
                    frames.push(frame);
                }
            }

            assert_eq!(frames.len(), messages.len(), "split at {split}");
            for (frame, expected) in frames.iter().zip(&messages) {
                assert_eq!(frame.type_id, expected.type_id());
            }
        }
    }

    #[test]
    fn byte_at_a_time_feeding_works() {
        let messages = sample_messages();
        let wire = encode_all(&messages);

        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::new();
        let mut frames = Vec::new();
        for byte in &wire[..] {
            buffer.extend_from_slice(&[*byte]);
            while let Some(frame) = codec.decode(&mut buffer).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), messages.len());
    }

    #[test]
    fn partial_header_is_buffered() {
        let mut codec = ControlCodec::new();
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&[0x00, 0x03, 0x00]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn oversized_frame_is_an_error() {
        let mut codec = ControlCodec::with_max_payload(16);
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&[0x00, 0x03, 0x00, 0x00, 0x01, 0x00]);
        let err = codec.decode(&mut buffer).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { length: 256, .. }));
    }

    #[test]
    fn consumed_bytes_are_released() {
        let messages = sample_messages();
        let mut wire = encode_all(&messages);
        let mut codec = ControlCodec::new();

        codec.decode(&mut wire).unwrap().expect("first frame");
        let remaining_after_first = wire.len();
        codec.decode(&mut wire).unwrap().expect("second frame");
        assert!(wire.len() < remaining_after_first);
    }
}
