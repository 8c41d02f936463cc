//! Adapter layer for running a synchronous TLS protocol engine on an
//! asynchronous host.
//!
//! The engine (handshake state machine plus record layer) is external and
//! synchronous; the host supplies network transport and, optionally,
//! accelerated crypto primitives asynchronously. This crate reconciles the
//! two execution models:
//!
//! - [`bridge`]: blocking-style wire callbacks bridged onto an async
//!   transport, suspending exactly where the engine would block.
//! - [`OffloadDispatcher`]: selected AEAD and streaming-hash operations
//!   intercepted and delegated to an async crypto provider, with a declined
//!   operation signalling the engine to fall back to its native code.
//! - [`TlsConnector`]: connection lifecycle from engine construction through
//!   handshake, with one idempotent teardown on every failure path.
//!
//! Single-threaded, cooperative: one connection never issues two operations
//! concurrently, so the shared state here needs no locking.

#![allow(async_fn_in_trait)]

mod bridge;
mod connector;
mod digest;
mod engine;
mod error;
mod offload;
mod provider;
mod stream;

#[cfg(any(test, feature = "testing"))]
pub mod testutil;

pub use bridge::{IoBridge, ReadBuffer, WireHandle, WriteBuffer};
pub use connector::{default_cipher_preference, TlsConnector, DEFAULT_TRUST_ANCHORS};
pub use engine::{
    AeadCipher, AeadRequest, CryptoDone, CryptoRequest, DeviceId, Direction, EngineFactory,
    HashAlg, HashRequest, SessionSetup, Step, TlsEngine, Want,
};
pub use error::{EngineError, TlsError};
pub use offload::OffloadDispatcher;
pub use provider::{Capabilities, CryptoProvider, DigestStream, OpenError};
pub use stream::TlsStream;
