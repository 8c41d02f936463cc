//! Software crypto provider backed by `ring` (AEAD) and `sha2` (streaming
//! digests).
//!
//! Follows the combined-buffer convention the dispatcher expects: seal
//! appends the tag to the ciphertext, open consumes ciphertext with the tag
//! appended and verifies before releasing plaintext. The provider calls are
//! `async` to honour the suspension-point contract even though this
//! implementation computes inline.

#![allow(async_fn_in_trait)]

use std::io;

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtls::{AeadCipher, Capabilities, CryptoProvider, DigestStream, HashAlg, OpenError};

#[derive(Debug, Clone, Copy, Default)]
pub struct RingCrypto;

impl RingCrypto {
    pub fn new() -> Self {
        RingCrypto
    }
}

fn algorithm(cipher: AeadCipher) -> &'static aead::Algorithm {
    match cipher {
        AeadCipher::Aes128Gcm => &aead::AES_128_GCM,
        AeadCipher::Aes256Gcm => &aead::AES_256_GCM,
        AeadCipher::ChaCha20Poly1305 => &aead::CHACHA20_POLY1305,
    }
}

fn key_for(cipher: AeadCipher, key: &[u8], tag_bits: u32) -> io::Result<LessSafeKey> {
    let alg = algorithm(cipher);
    if tag_bits as usize != alg.tag_len() * 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported tag length: {tag_bits} bits"),
        ));
    }
    if key.len() != cipher.key_len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bad key length {} for {cipher:?}", key.len()),
        ));
    }
    let unbound = UnboundKey::new(alg, key)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "key rejected"))?;
    Ok(LessSafeKey::new(unbound))
}

fn nonce_for(nonce: &[u8]) -> io::Result<Nonce> {
    Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad nonce length"))
}

impl CryptoProvider for RingCrypto {
    type Digest = Sha2Stream;

    fn probe(&mut self) -> Capabilities {
        Capabilities {
            digest_stream: true,
        }
    }

    async fn seal(
        &mut self,
        cipher: AeadCipher,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag_bits: u32,
        plaintext: &[u8],
    ) -> io::Result<Vec<u8>> {
        let key = key_for(cipher, key, tag_bits)?;
        let nonce = nonce_for(nonce)?;
        let mut buf = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::from(aad), &mut buf)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "seal failed"))?;
        Ok(buf)
    }

    async fn open(
        &mut self,
        cipher: AeadCipher,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag_bits: u32,
        tagged: &[u8],
    ) -> Result<Vec<u8>, OpenError> {
        let key = key_for(cipher, key, tag_bits).map_err(OpenError::Provider)?;
        let nonce = nonce_for(nonce).map_err(OpenError::Provider)?;
        if tagged.len() < key.algorithm().tag_len() {
            return Err(OpenError::Provider(io::Error::new(
                io::ErrorKind::InvalidInput,
                "input shorter than tag",
            )));
        }
        let mut buf = tagged.to_vec();
        // ring verifies the tag before exposing any plaintext; a mismatch
        // comes back as one opaque error.
        let plaintext = key
            .open_in_place(nonce, Aad::from(aad), &mut buf)
            .map_err(|_| OpenError::BadTag)?;
        Ok(plaintext.to_vec())
    }

    async fn open_digest(&mut self, alg: HashAlg) -> io::Result<Sha2Stream> {
        match alg {
            HashAlg::Sha256 => Ok(Sha2Stream::Sha256(Sha256::new())),
            HashAlg::Sha384 => Ok(Sha2Stream::Sha384(Sha384::new())),
            HashAlg::Sha512 => Ok(Sha2Stream::Sha512(Sha512::new())),
            HashAlg::Sha1 => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no streaming sha-1",
            )),
        }
    }
}

/// One incremental hash session. Chunks are folded in call order.
#[derive(Debug)]
pub enum Sha2Stream {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl DigestStream for Sha2Stream {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Sha2Stream::Sha256(h) => h.update(chunk),
            Sha2Stream::Sha384(h) => h.update(chunk),
            Sha2Stream::Sha512(h) => h.update(chunk),
        }
        Ok(())
    }

    async fn finish(self) -> io::Result<Vec<u8>> {
        Ok(match self {
            Sha2Stream::Sha256(h) => h.finalize().to_vec(),
            Sha2Stream::Sha384(h) => h.finalize().to_vec(),
            Sha2Stream::Sha512(h) => h.finalize().to_vec(),
        })
    }
}
