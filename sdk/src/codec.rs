//! External boundaries: audio codec math and the voice-payload cipher.
//!
//! The client negotiates *which* codec handles each packet and plumbs
//! cipher key material through, but the DSP and crypto themselves are
//! supplied by the host application.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Fixed sample rate of the voice path.
pub const SAMPLE_RATE: u32 = 48_000;

/// Bitstream version of CELT 0.7.0, the baseline codec every 1.2.x
/// server can negotiate.
pub const CELT_ALPHA_BITSTREAM: u32 = 0x8000_000b;

/// Bitstream version of CELT 0.11.x.
pub const CELT_BETA_BITSTREAM: u32 = 0x8000_0010;

#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// One negotiated audio codec instance.
///
/// Implementations wrap a real CELT/Speex library; a failed decode drops
/// only the affected frame.
pub trait AudioCodec: Send {
    /// Compresses one frame of mono PCM at [`SAMPLE_RATE`].
    ///
    /// # Errors
    /// [`CodecError::Encode`] if the frame cannot be compressed.
    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>, CodecError>;

    /// Decompresses one frame into mono PCM at [`SAMPLE_RATE`].
    ///
    /// # Errors
    /// [`CodecError::Decode`] if the frame is undecodable.
    fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError>;
}

type CodecFactory = Box<dyn Fn(u32) -> Box<dyn AudioCodec> + Send + Sync>;

/// Table of codec constructors keyed by bitstream version.
///
/// Codec-version messages are resolved against this table; versions the
/// host never registered cannot be negotiated.
#[derive(Default)]
pub struct CodecRegistry {
    factories: HashMap<u32, CodecFactory>,
}

impl CodecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for one bitstream version. The factory is
    /// called with the sample rate whenever the version is negotiated.
    pub fn register<F>(&mut self, bitstream_version: u32, factory: F)
    where
        F: Fn(u32) -> Box<dyn AudioCodec> + Send + Sync + 'static,
    {
        self.factories.insert(bitstream_version, Box::new(factory));
    }

    #[must_use]
    pub fn supports(&self, bitstream_version: u32) -> bool {
        self.factories.contains_key(&bitstream_version)
    }

    /// Registered versions, newest first; advertised to the server
    /// during authentication.
    #[must_use]
    pub fn known_versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self.factories.keys().copied().collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions
    }

    pub(crate) fn instantiate(&self, bitstream_version: u32) -> Option<Box<dyn AudioCodec>> {
        self.factories
            .get(&bitstream_version)
            .map(|factory| factory(SAMPLE_RATE))
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("versions", &self.known_versions())
            .finish()
    }
}

/// Cipher boundary for the datagram voice path.
///
/// Key material arrives in crypt-setup messages and is handed over
/// as-is; what happens to the payload bytes is up to the implementation.
pub trait VoiceCrypto: Send {
    /// Installs the shared key and per-direction nonces.
    fn set_key(&mut self, key: &[u8], client_nonce: &[u8], server_nonce: &[u8]);

    /// Protects one outgoing datagram.
    fn encrypt(&mut self, plain: &[u8]) -> Vec<u8>;

    /// Recovers one incoming datagram; `None` drops it as unauthentic.
    fn decrypt(&mut self, data: &[u8]) -> Option<Vec<u8>>;
}

/// Default cipher boundary: stores the key material and passes payloads
/// through unchanged, for use until the host installs a real cipher.
#[derive(Debug, Default)]
pub struct PlaintextCrypto {
    key: Option<Vec<u8>>,
    client_nonce: Option<Vec<u8>>,
    server_nonce: Option<Vec<u8>>,
}

impl PlaintextCrypto {
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn client_nonce(&self) -> Option<&[u8]> {
        self.client_nonce.as_deref()
    }

    #[must_use]
    pub fn server_nonce(&self) -> Option<&[u8]> {
        self.server_nonce.as_deref()
    }
}

impl VoiceCrypto for PlaintextCrypto {
    fn set_key(&mut self, key: &[u8], client_nonce: &[u8], server_nonce: &[u8]) {
        self.key = Some(key.to_vec());
        self.client_nonce = Some(client_nonce.to_vec());
        self.server_nonce = Some(server_nonce.to_vec());
    }

    fn encrypt(&mut self, plain: &[u8]) -> Vec<u8> {
        plain.to_vec()
    }

    fn decrypt(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        Some(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullCodec;

    impl AudioCodec for NullCodec {
        fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>, CodecError> {
            Ok(vec![0; pcm.len()])
        }

        fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError> {
            Ok(vec![0; frame.len()])
        }
    }

    #[test]
    fn registry_resolves_registered_versions() {
        let mut registry = CodecRegistry::new();
        registry.register(CELT_ALPHA_BITSTREAM, |_| Box::new(NullCodec));

        assert!(registry.supports(CELT_ALPHA_BITSTREAM));
        assert!(!registry.supports(CELT_BETA_BITSTREAM));
        assert!(registry.instantiate(CELT_ALPHA_BITSTREAM).is_some());
        assert!(registry.instantiate(CELT_BETA_BITSTREAM).is_none());
        assert_eq!(registry.known_versions(), vec![CELT_ALPHA_BITSTREAM]);
    }

    #[test]
    fn plaintext_crypto_stores_key_material() {
        let mut crypto = PlaintextCrypto::default();
        crypto.set_key(&[1; 16], &[2; 16], &[3; 16]);
        assert_eq!(crypto.key(), Some(&[1u8; 16][..]));
        assert_eq!(crypto.encrypt(&[9, 9]), vec![9, 9]);
        assert_eq!(crypto.decrypt(&[8]), Some(vec![8]));
    }
}
