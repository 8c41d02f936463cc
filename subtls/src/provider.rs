//! Boundary with the host crypto provider.
//!
//! Providers are asynchronous: every call here is a suspension point for the
//! connection that issued it. The AEAD surface follows the combined-buffer
//! convention of platform crypto APIs: seal returns ciphertext with the tag
//! appended, open consumes ciphertext with the tag appended and verifies it
//! atomically before releasing any plaintext.

use std::io;

use thiserror::Error;

use crate::engine::{AeadCipher, HashAlg};

/// Which accelerated primitives exist in the current host environment.
/// Probed once per connection and cached; never re-queried, even if the
/// host environment changes mid-connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub digest_stream: bool,
}

/// Failure mode of a verifying AEAD open.
#[derive(Error, Debug)]
pub enum OpenError {
    /// Tag mismatch. The provider produced no plaintext.
    #[error("aead tag mismatch")]
    BadTag,
    #[error("provider failure")]
    Provider(#[source] io::Error),
}

/// One incremental hash session on the provider side. Chunks are processed
/// strictly in call order.
pub trait DigestStream {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Close the session and retrieve the digest.
    async fn finish(self) -> io::Result<Vec<u8>>;
}

pub trait CryptoProvider {
    type Digest: DigestStream;

    /// One-shot capability query. Called exactly once per connection, before
    /// the offload dispatcher takes its first operation.
    fn probe(&mut self) -> Capabilities;

    /// AEAD encrypt. `tag_bits` is the provider-side tag length convention.
    /// Returns ciphertext with the tag appended.
    async fn seal(
        &mut self,
        cipher: AeadCipher,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag_bits: u32,
        plaintext: &[u8],
    ) -> io::Result<Vec<u8>>;

    /// AEAD decrypt-and-verify over ciphertext with the tag appended. Fails
    /// closed: a tag mismatch yields [`OpenError::BadTag`] and no plaintext.
    async fn open(
        &mut self,
        cipher: AeadCipher,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag_bits: u32,
        tagged: &[u8],
    ) -> Result<Vec<u8>, OpenError>;

    /// Open a streaming-hash session for `alg`.
    async fn open_digest(&mut self, alg: HashAlg) -> io::Result<Self::Digest>;
}
