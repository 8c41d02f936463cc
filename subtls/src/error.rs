use std::io;

use thiserror::Error;

/// Failure reported by the wrapped TLS engine, in the engine's own integer
/// convention plus a human-readable reason. The reason is advisory only and
/// not part of the contract.
#[derive(Error, Debug)]
#[error("engine error {code}: {reason}")]
pub struct EngineError {
    pub code: i32,
    pub reason: String,
}

impl EngineError {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Adapter-level failures.
///
/// An AEAD tag mismatch is deliberately absent: the dispatcher hands it to
/// the engine as [`crate::CryptoDone::BadTag`], and the engine reports the
/// authentication failure in its own code convention ([`TlsError::Engine`]).
#[derive(Error, Debug)]
pub enum TlsError {
    /// Transport-level failure.
    #[error("io error")]
    Io(#[from] io::Error),
    /// The transport reported end of stream. Never surfaced as a
    /// zero-length read.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The crypto provider itself failed (not a declined capability and not
    /// a tag mismatch).
    #[error("crypto provider error")]
    Provider(#[source] io::Error),
    /// A streaming-hash session is already open for a different algorithm.
    #[error("digest session busy")]
    DigestSessionBusy,
    /// Finalize was requested with no streaming-hash session open.
    #[error("digest session idle")]
    DigestSessionIdle,
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A connection setup step failed. Everything allocated so far has
    /// already been torn down.
    #[error("tls setup failed at {step}")]
    Setup {
        step: &'static str,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TlsError {
    pub(crate) fn setup(step: &'static str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        TlsError::Setup {
            step,
            source: Some(source.into()),
        }
    }
}

impl From<TlsError> for io::Error {
    fn from(e: TlsError) -> Self {
        match e {
            TlsError::Io(e) => e,
            TlsError::ConnectionClosed => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
