use bytes::Bytes;

use crate::bridge::WireHandle;
use crate::error::EngineError;

/// Which side of the wire the engine is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Want {
    Read,
    Write,
}

/// Outcome of driving the engine one step.
///
/// A synchronous engine cannot await anything itself; instead every point
/// where the reference callback interface would block is surfaced as a value
/// and the driver suspends on it.
#[derive(Debug)]
pub enum Step<T> {
    /// The operation ran to completion.
    Done(T),
    /// The engine is parked on wire I/O; drive the transport and call again.
    Io(Want),
    /// The engine is parked on an offloadable crypto primitive. Dispatch it
    /// and feed the outcome back through [`TlsEngine::resume_crypto`].
    Crypto(CryptoRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadCipher {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadCipher {
    pub fn key_len(&self) -> usize {
        match self {
            AeadCipher::Aes128Gcm => 16,
            AeadCipher::Aes256Gcm | AeadCipher::ChaCha20Poly1305 => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Seal,
    Open,
}

/// One AEAD operation surfaced by the engine.
///
/// Payloads are cheap `Bytes` handles so the request can outlive the engine
/// call that produced it while the driver awaits the provider.
#[derive(Debug, Clone)]
pub struct AeadRequest {
    pub direction: Direction,
    pub cipher: AeadCipher,
    pub key: Bytes,
    pub nonce: Bytes,
    pub aad: Bytes,
    /// Plaintext for `Seal`, ciphertext without its tag for `Open`.
    pub data: Bytes,
    /// Received tag for `Open`; empty for `Seal`.
    pub tag: Bytes,
    /// Tag size in bytes, the engine's convention. Providers count bits.
    pub tag_len: usize,
}

#[derive(Debug, Clone)]
pub enum HashRequest {
    Update { alg: HashAlg, chunk: Bytes },
    Finalize { alg: HashAlg },
}

impl HashRequest {
    pub fn alg(&self) -> HashAlg {
        match self {
            HashRequest::Update { alg, .. } | HashRequest::Finalize { alg } => *alg,
        }
    }
}

/// Tagged union over the crypto operations an engine may offload.
/// Constructed by the engine, consumed by one dispatch, never stored.
#[derive(Debug, Clone)]
pub enum CryptoRequest {
    Aead(AeadRequest),
    Hash(HashRequest),
}

/// Outcome of a dispatched [`CryptoRequest`], handed back to the engine.
#[derive(Debug, Clone)]
pub enum CryptoDone {
    /// The host cannot take this operation. Not an error: the engine must
    /// fall back to its native implementation and continue.
    Unavailable,
    Sealed { ciphertext: Bytes, tag: Bytes },
    Opened { plaintext: Bytes },
    /// Tag verification failed. No plaintext was produced.
    BadTag,
    HashAccepted,
    Digest(Bytes),
}

/// A synchronous TLS protocol engine with explicit suspension points.
///
/// Wire access happens through the [`WireHandle`] the engine received at
/// construction: `io::Read`/`io::Write` that fail with `WouldBlock` when the
/// transport bridge has to be driven. The engine reports that condition (and
/// parked crypto operations) through [`Step`] instead of blocking.
///
/// Engines are single-flight: a `drive_*` call must not be issued while an
/// earlier suspended operation has not been driven to completion.
pub trait TlsEngine {
    fn drive_connect(&mut self) -> Result<Step<()>, EngineError>;

    /// Decrypt application data into `buf`. `Done(n)` delivers `n` bytes.
    fn drive_read(&mut self, buf: &mut [u8]) -> Result<Step<usize>, EngineError>;

    /// Encrypt and queue application data. `Done(n)` accepted `n` bytes;
    /// resubmission of a short write is the caller's business.
    fn drive_write(&mut self, buf: &[u8]) -> Result<Step<usize>, EngineError>;

    fn drive_shutdown(&mut self) -> Result<Step<()>, EngineError>;

    /// Plaintext already decrypted and waiting to be read.
    fn pending(&self) -> usize;

    /// Deliver the outcome of the crypto operation the engine is parked on.
    fn resume_crypto(&mut self, done: CryptoDone) -> Result<(), EngineError>;
}

/// Identity under which offloaded operations are registered with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub u32);

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId(1)
    }
}

/// Everything the connector resolved for one session before the engine is
/// built: trust anchors, cipher preference, name checks, offload identity.
#[derive(Debug)]
pub struct SessionSetup<'a> {
    /// PEM-encoded trust anchors.
    pub trust_anchors: &'a [u8],
    /// Ordered preference list; first mutually supported suite wins in the
    /// engine's own negotiation.
    pub cipher_preference: &'a [&'static str],
    /// SNI hostname, if SNI is enabled.
    pub server_name: Option<&'a str>,
    /// Hostname the peer certificate must verify against.
    pub verify_hostname: &'a str,
    /// `None` disables the crypto hook entirely; the engine then never
    /// emits [`Step::Crypto`].
    pub offload_device: Option<DeviceId>,
}

/// Builds an engine over a wire handle, applying the session setup.
/// Any failed setup step must leave nothing behind; the connector tears the
/// rest of the connection down.
pub trait EngineFactory {
    type Engine: TlsEngine;

    fn build(
        &self,
        setup: &SessionSetup<'_>,
        wire: WireHandle,
    ) -> Result<Self::Engine, EngineError>;
}
