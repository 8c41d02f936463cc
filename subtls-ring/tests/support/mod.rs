//! Scripted TLS engine for exercising the adapter stack end to end without
//! a real TLS implementation.
//!
//! Wire protocol: the client sends `CLIENT_HELLO`, expects `SERVER_HELLO`
//! back, then optionally offloads a transcript hash over both hellos.
//! Application records are `u16 big-endian ciphertext length || ciphertext
//! || 16-byte tag`, AES-128-GCM under a fixed key/nonce. When offload is
//! declined the engine falls back to an XOR "cipher" with a constant tag,
//! which keeps the fallback path observable in tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use bytes::Bytes;
use subtls::{
    AeadCipher, AeadRequest, Capabilities, CryptoDone, CryptoProvider, CryptoRequest, Direction,
    EngineError, EngineFactory, HashAlg, HashRequest, SessionSetup, Step, TlsEngine, WireHandle,
};
use subtls_ring::RingCrypto;

pub const CLIENT_HELLO: &[u8] = b"SUBTLS-HELLO";
pub const SERVER_HELLO: &[u8] = b"SUBTLS-ACCEPT";
pub const KEY: [u8; 16] = [0x07; 16];
pub const NONCE: [u8; 12] = [0x03; 12];
pub const AAD: &[u8] = b"subtls-mock";
pub const TAG_LEN: usize = 16;
pub const NATIVE_TAG: [u8; TAG_LEN] = [0xee; TAG_LEN];
pub const AUTH_FAILURE_CODE: i32 = -180;

fn hash_update(chunk: &'static [u8]) -> CryptoRequest {
    CryptoRequest::Hash(HashRequest::Update {
        alg: HashAlg::Sha256,
        chunk: Bytes::from_static(chunk),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    SendHello,
    AwaitHello,
    Transcript,
    Ready,
}

#[derive(Debug)]
enum Pending {
    None,
    Open { ciphertext: Bytes, tag: Bytes },
    SealWait { accepted: usize, plaintext: Vec<u8> },
    SealDone { frame: Vec<u8>, written: usize, accepted: usize },
}

pub struct MockEngine {
    wire: WireHandle,
    offload: bool,
    phase: Phase,
    hello_buf: Vec<u8>,
    crypto_queue: VecDeque<CryptoRequest>,
    pub transcript: Option<Vec<u8>>,
    pub native_transcript: bool,
    pending: Pending,
    inbox: VecDeque<u8>,
    frame: Vec<u8>,
    auth_failed: bool,
    shutdown_done: bool,
}

impl MockEngine {
    fn new(wire: WireHandle, offload: bool) -> Self {
        Self {
            wire,
            offload,
            phase: Phase::SendHello,
            hello_buf: Vec::new(),
            crypto_queue: VecDeque::new(),
            transcript: None,
            native_transcript: false,
            pending: Pending::None,
            inbox: VecDeque::new(),
            frame: Vec::new(),
            auth_failed: false,
            shutdown_done: false,
        }
    }

    fn frame_target(&self) -> usize {
        if self.frame.len() < 2 {
            2
        } else {
            let len = u16::from_be_bytes([self.frame[0], self.frame[1]]) as usize;
            2 + len + TAG_LEN
        }
    }

    /// Pull wire bytes into `self.frame` until a whole record is present.
    fn fill_frame(&mut self) -> Result<Option<Step<usize>>, EngineError> {
        loop {
            let target = self.frame_target();
            if self.frame.len() >= target && self.frame.len() >= 2 {
                return Ok(None);
            }
            let mut chunk = [0u8; 256];
            let want = (target - self.frame.len()).min(chunk.len());
            match self.wire.read(&mut chunk[..want]) {
                Ok(0) => return Err(EngineError::new(-3, "transport eof inside record")),
                Ok(n) => self.frame.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Some(Step::Io(subtls::Want::Read)))
                }
                Err(e) => return Err(EngineError::new(-4, e.to_string())),
            }
        }
    }

    fn xor_keystream(data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b ^ 0x42).collect()
    }
}

impl TlsEngine for MockEngine {
    fn drive_connect(&mut self) -> Result<Step<()>, EngineError> {
        loop {
            match self.phase {
                Phase::SendHello => match self.wire.write(CLIENT_HELLO) {
                    Ok(n) if n == CLIENT_HELLO.len() => {
                        self.phase = Phase::AwaitHello;
                        return Ok(Step::Io(subtls::Want::Write));
                    }
                    Ok(_) => return Err(EngineError::new(-1, "short hello write")),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(Step::Io(subtls::Want::Write))
                    }
                    Err(e) => return Err(EngineError::new(-2, e.to_string())),
                },
                Phase::AwaitHello => {
                    let mut chunk = [0u8; 64];
                    match self.wire.read(&mut chunk) {
                        Ok(0) => return Err(EngineError::new(-3, "transport eof in handshake")),
                        Ok(n) => {
                            self.hello_buf.extend_from_slice(&chunk[..n]);
                            if self.hello_buf.len() < SERVER_HELLO.len() {
                                return Ok(Step::Io(subtls::Want::Read));
                            }
                            if self.hello_buf != SERVER_HELLO {
                                return Err(EngineError::new(-155, "unexpected server hello"));
                            }
                            if self.offload {
                                self.crypto_queue = VecDeque::from([
                                    hash_update(CLIENT_HELLO),
                                    hash_update(SERVER_HELLO),
                                    CryptoRequest::Hash(HashRequest::Finalize {
                                        alg: HashAlg::Sha256,
                                    }),
                                ]);
                                self.phase = Phase::Transcript;
                            } else {
                                self.native_transcript = true;
                                self.phase = Phase::Ready;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(Step::Io(subtls::Want::Read))
                        }
                        Err(e) => return Err(EngineError::new(-4, e.to_string())),
                    }
                }
                Phase::Transcript => match self.crypto_queue.front() {
                    Some(req) => return Ok(Step::Crypto(req.clone())),
                    None => self.phase = Phase::Ready,
                },
                Phase::Ready => return Ok(Step::Done(())),
            }
        }
    }

    fn drive_read(&mut self, buf: &mut [u8]) -> Result<Step<usize>, EngineError> {
        if self.shutdown_done {
            return Err(EngineError::new(-323, "read after shutdown"));
        }
        if self.auth_failed {
            return Err(EngineError::new(
                AUTH_FAILURE_CODE,
                "record authentication failed",
            ));
        }
        if !self.inbox.is_empty() {
            let n = self.inbox.len().min(buf.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbox.pop_front().unwrap_or_default();
            }
            return Ok(Step::Done(n));
        }

        if let Some(step) = self.fill_frame()? {
            return Ok(step);
        }
        let len = u16::from_be_bytes([self.frame[0], self.frame[1]]) as usize;
        let ciphertext = Bytes::copy_from_slice(&self.frame[2..2 + len]);
        let tag = Bytes::copy_from_slice(&self.frame[2 + len..]);
        self.frame.clear();

        if self.offload {
            self.pending = Pending::Open {
                ciphertext: ciphertext.clone(),
                tag: tag.clone(),
            };
            return Ok(Step::Crypto(CryptoRequest::Aead(AeadRequest {
                direction: Direction::Open,
                cipher: AeadCipher::Aes128Gcm,
                key: Bytes::copy_from_slice(&KEY),
                nonce: Bytes::copy_from_slice(&NONCE),
                aad: Bytes::from_static(AAD),
                data: ciphertext,
                tag,
                tag_len: TAG_LEN,
            })));
        }

        // native path: constant tag, XOR keystream
        if tag.as_ref() != NATIVE_TAG {
            self.auth_failed = true;
            return Err(EngineError::new(
                AUTH_FAILURE_CODE,
                "record authentication failed",
            ));
        }
        self.inbox.extend(Self::xor_keystream(&ciphertext));
        let n = self.inbox.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.inbox.pop_front().unwrap_or_default();
        }
        Ok(Step::Done(n))
    }

    fn drive_write(&mut self, buf: &[u8]) -> Result<Step<usize>, EngineError> {
        if self.shutdown_done {
            return Err(EngineError::new(-324, "write after shutdown"));
        }
        loop {
            match &mut self.pending {
                Pending::None => {
                    if self.offload {
                        self.pending = Pending::SealWait {
                            accepted: buf.len(),
                            plaintext: buf.to_vec(),
                        };
                        return Ok(Step::Crypto(CryptoRequest::Aead(AeadRequest {
                            direction: Direction::Seal,
                            cipher: AeadCipher::Aes128Gcm,
                            key: Bytes::copy_from_slice(&KEY),
                            nonce: Bytes::copy_from_slice(&NONCE),
                            aad: Bytes::from_static(AAD),
                            data: Bytes::copy_from_slice(buf),
                            tag: Bytes::new(),
                            tag_len: TAG_LEN,
                        })));
                    }
                    let ciphertext = Self::xor_keystream(buf);
                    let mut frame = Vec::with_capacity(2 + ciphertext.len() + TAG_LEN);
                    frame.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
                    frame.extend_from_slice(&ciphertext);
                    frame.extend_from_slice(&NATIVE_TAG);
                    self.pending = Pending::SealDone {
                        frame,
                        written: 0,
                        accepted: buf.len(),
                    };
                }
                Pending::SealWait { .. } => {
                    return Err(EngineError::new(-5, "write re-entered while sealing"))
                }
                Pending::SealDone {
                    frame,
                    written,
                    accepted,
                } => match self.wire.write(&frame[*written..]) {
                    Ok(n) => {
                        *written += n;
                        if *written == frame.len() {
                            let accepted = *accepted;
                            self.pending = Pending::None;
                            return Ok(Step::Done(accepted));
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(Step::Io(subtls::Want::Write))
                    }
                    Err(e) => return Err(EngineError::new(-6, e.to_string())),
                },
                Pending::Open { .. } => {
                    return Err(EngineError::new(-7, "write re-entered while opening"))
                }
            }
        }
    }

    fn drive_shutdown(&mut self) -> Result<Step<()>, EngineError> {
        if self.shutdown_done {
            return Ok(Step::Done(()));
        }
        // close marker record
        match self.wire.write(&[0xff, 0xff]) {
            Ok(2) => {
                self.shutdown_done = true;
                Ok(Step::Done(()))
            }
            Ok(_) => Ok(Step::Io(subtls::Want::Write)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Step::Io(subtls::Want::Write)),
            Err(e) => Err(EngineError::new(-8, e.to_string())),
        }
    }

    fn pending(&self) -> usize {
        self.inbox.len()
    }

    fn resume_crypto(&mut self, done: CryptoDone) -> Result<(), EngineError> {
        match done {
            CryptoDone::HashAccepted => {
                self.crypto_queue.pop_front();
                Ok(())
            }
            CryptoDone::Digest(digest) => {
                self.crypto_queue.pop_front();
                if digest.len() != HashAlg::Sha256.digest_len() {
                    return Err(EngineError::new(-9, "bad transcript digest length"));
                }
                self.transcript = Some(digest.to_vec());
                Ok(())
            }
            CryptoDone::Opened { plaintext } => {
                self.pending = Pending::None;
                self.inbox.extend(plaintext.iter());
                Ok(())
            }
            CryptoDone::BadTag => {
                self.pending = Pending::None;
                self.auth_failed = true;
                Ok(())
            }
            CryptoDone::Sealed { ciphertext, tag } => {
                let accepted = match &self.pending {
                    Pending::SealWait { accepted, .. } => *accepted,
                    _ => return Err(EngineError::new(-10, "unexpected seal completion")),
                };
                let mut frame = Vec::with_capacity(2 + ciphertext.len() + tag.len());
                frame.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
                frame.extend_from_slice(&ciphertext);
                frame.extend_from_slice(&tag);
                self.pending = Pending::SealDone {
                    frame,
                    written: 0,
                    accepted,
                };
                Ok(())
            }
            CryptoDone::Unavailable => {
                // fall back to native implementations
                match std::mem::replace(&mut self.pending, Pending::None) {
                    Pending::SealWait { accepted, plaintext } => {
                        let ciphertext = Self::xor_keystream(&plaintext);
                        let mut frame = Vec::with_capacity(2 + ciphertext.len() + TAG_LEN);
                        frame.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
                        frame.extend_from_slice(&ciphertext);
                        frame.extend_from_slice(&NATIVE_TAG);
                        self.pending = Pending::SealDone {
                            frame,
                            written: 0,
                            accepted,
                        };
                    }
                    Pending::Open { ciphertext, tag } => {
                        if tag.as_ref() == NATIVE_TAG {
                            self.inbox.extend(Self::xor_keystream(&ciphertext));
                        } else {
                            self.auth_failed = true;
                        }
                    }
                    Pending::None | Pending::SealDone { .. } => {
                        // declined transcript hashing: compute natively
                        self.crypto_queue.clear();
                        self.native_transcript = true;
                    }
                }
                Ok(())
            }
        }
    }
}

/// What the factory saw in [`SessionSetup`], for assertions.
#[derive(Debug, Clone)]
pub struct SetupRecord {
    pub sni: Option<String>,
    pub verify_hostname: String,
    pub cipher_preference: Vec<String>,
    pub trust_anchor_len: usize,
    pub offload: bool,
}

#[derive(Clone, Default)]
pub struct MockEngineFactory {
    pub fail_build: bool,
    pub recorded: Rc<RefCell<Vec<SetupRecord>>>,
}

impl EngineFactory for MockEngineFactory {
    type Engine = MockEngine;

    fn build(
        &self,
        setup: &SessionSetup<'_>,
        wire: WireHandle,
    ) -> Result<MockEngine, EngineError> {
        if !setup
            .trust_anchors
            .starts_with(b"-----BEGIN CERTIFICATE-----")
        {
            return Err(EngineError::new(-77, "trust anchor buffer is not PEM"));
        }
        self.recorded.borrow_mut().push(SetupRecord {
            sni: setup.server_name.map(str::to_owned),
            verify_hostname: setup.verify_hostname.to_owned(),
            cipher_preference: setup
                .cipher_preference
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trust_anchor_len: setup.trust_anchors.len(),
            offload: setup.offload_device.is_some(),
        });
        if self.fail_build {
            return Err(EngineError::new(-78, "context allocation failed"));
        }
        Ok(MockEngine::new(wire, setup.offload_device.is_some()))
    }
}

/// [`RingCrypto`] with an observable probe count.
#[derive(Clone, Default)]
pub struct CountingProvider {
    inner: RingCrypto,
    pub probes: Rc<Cell<usize>>,
}

impl CryptoProvider for CountingProvider {
    type Digest = subtls_ring::Sha2Stream;

    fn probe(&mut self) -> Capabilities {
        self.probes.set(self.probes.get() + 1);
        self.inner.probe()
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
        self.inner
            .seal(cipher, key, nonce, aad, tag_bits, plaintext)
            .await
    }

    async fn open(
        &mut self,
        cipher: AeadCipher,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        tag_bits: u32,
        tagged: &[u8],
    ) -> Result<Vec<u8>, subtls::OpenError> {
        self.inner
            .open(cipher, key, nonce, aad, tag_bits, tagged)
            .await
    }

    async fn open_digest(&mut self, alg: HashAlg) -> io::Result<subtls_ring::Sha2Stream> {
        self.inner.open_digest(alg).await
    }
}

/// Record framing as the mock engine writes it, sealed with the real AEAD.
pub async fn sealed_frame(plaintext: &[u8]) -> Vec<u8> {
    let mut provider = RingCrypto::new();
    let sealed = provider
        .seal(
            AeadCipher::Aes128Gcm,
            &KEY,
            &NONCE,
            AAD,
            (TAG_LEN * 8) as u32,
            plaintext,
        )
        .await
        .expect("seal");
    let ct_len = sealed.len() - TAG_LEN;
    let mut frame = Vec::with_capacity(2 + sealed.len());
    frame.extend_from_slice(&(ct_len as u16).to_be_bytes());
    frame.extend_from_slice(&sealed);
    frame
}
