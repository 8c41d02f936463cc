//! Crypto-offload dispatcher.
//!
//! Classifies each operation the engine parked on and either delegates it to
//! the host crypto provider or declines, signalling the engine to run its
//! native implementation. Declining is the designed fallback path, not a
//! failure. Classification uses only the request and the capabilities cached
//! at construction, so a dispatch decision is reproducible from its inputs.

use std::io;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::digest::DigestAccumulator;
use crate::engine::{
    AeadCipher, AeadRequest, CryptoDone, CryptoRequest, Direction, HashAlg, HashRequest,
};
use crate::error::TlsError;
use crate::provider::{Capabilities, CryptoProvider, OpenError};

pub struct OffloadDispatcher<P: CryptoProvider> {
    provider: P,
    caps: Capabilities,
    digest: DigestAccumulator<P::Digest>,
}

/// Ciphers the offload path takes. Platform AEAD acceleration covers the
/// GCM suites; ChaCha20-Poly1305 stays on the engine's native code.
fn offloadable_cipher(cipher: AeadCipher) -> bool {
    matches!(cipher, AeadCipher::Aes128Gcm | AeadCipher::Aes256Gcm)
}

/// Hash variants the streaming-digest path takes. SHA-1 transcripts stay on
/// the engine's native code.
fn offloadable_hash(alg: HashAlg) -> bool {
    matches!(alg, HashAlg::Sha256 | HashAlg::Sha384 | HashAlg::Sha512)
}

impl<P: CryptoProvider> OffloadDispatcher<P> {
    /// Probes the provider once; the result is fixed for this connection.
    pub fn new(mut provider: P) -> Self {
        let caps = provider.probe();
        debug!(digest_stream = caps.digest_stream, "crypto capabilities probed");
        Self {
            provider,
            caps,
            digest: DigestAccumulator::new(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Route one operation. `Ok(CryptoDone::Unavailable)` asks the engine to
    /// fall back; `Err` is a real provider or session failure.
    pub async fn dispatch(&mut self, request: CryptoRequest) -> Result<CryptoDone, TlsError> {
        match request {
            CryptoRequest::Aead(req) if offloadable_cipher(req.cipher) => {
                self.dispatch_aead(req).await
            }
            CryptoRequest::Hash(req) if self.caps.digest_stream && offloadable_hash(req.alg()) => {
                self.dispatch_hash(req).await
            }
            CryptoRequest::Aead(req) => {
                debug!(cipher = ?req.cipher, "declining aead op, engine falls back");
                Ok(CryptoDone::Unavailable)
            }
            CryptoRequest::Hash(req) => {
                debug!(alg = ?req.alg(), "declining hash op, engine falls back");
                Ok(CryptoDone::Unavailable)
            }
        }
    }

    async fn dispatch_aead(&mut self, req: AeadRequest) -> Result<CryptoDone, TlsError> {
        // The engine counts tag bytes, the provider counts bits.
        let tag_bits = (req.tag_len * 8) as u32;

        match req.direction {
            Direction::Seal => {
                let sealed = self
                    .provider
                    .seal(req.cipher, &req.key, &req.nonce, &req.aad, tag_bits, &req.data)
                    .await
                    .map_err(TlsError::Provider)?;
                if sealed.len() != req.data.len() + req.tag_len {
                    return Err(TlsError::Provider(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "sealed output length mismatch",
                    )));
                }
                // Split the combined ciphertext||tag into the engine's two
                // output buffers.
                let mut sealed = Bytes::from(sealed);
                let tag = sealed.split_off(req.data.len());
                Ok(CryptoDone::Sealed {
                    ciphertext: sealed,
                    tag,
                })
            }
            Direction::Open => {
                // The provider verifies over the combined buffer and fails
                // atomically, so concatenate ciphertext and tag first.
                let mut tagged = BytesMut::with_capacity(req.data.len() + req.tag.len());
                tagged.extend_from_slice(&req.data);
                tagged.extend_from_slice(&req.tag);
                match self
                    .provider
                    .open(req.cipher, &req.key, &req.nonce, &req.aad, tag_bits, &tagged)
                    .await
                {
                    Ok(plaintext) => Ok(CryptoDone::Opened {
                        plaintext: plaintext.into(),
                    }),
                    Err(OpenError::BadTag) => {
                        warn!(cipher = ?req.cipher, "aead open rejected: tag mismatch");
                        Ok(CryptoDone::BadTag)
                    }
                    Err(OpenError::Provider(e)) => Err(TlsError::Provider(e)),
                }
            }
        }
    }

    async fn dispatch_hash(&mut self, req: HashRequest) -> Result<CryptoDone, TlsError> {
        match req {
            HashRequest::Update { alg, chunk } => {
                self.digest.absorb(&mut self.provider, alg, &chunk).await?;
                Ok(CryptoDone::HashAccepted)
            }
            HashRequest::Finalize { alg } => {
                let digest = self.digest.finalize(alg).await?;
                Ok(CryptoDone::Digest(digest.into()))
            }
        }
    }

    /// Drop any provider-side session state. Idempotent; part of teardown.
    pub fn reset(&mut self) {
        self.digest.reset();
    }
}
