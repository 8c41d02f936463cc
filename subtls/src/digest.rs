//! Streaming-digest accumulator: at most one open incremental-hash session,
//! `Idle -> Accumulating -> Idle`.
//!
//! The slot is an explicit guard, never silently overwritten: an absorb for
//! a different algorithm while a session is open is rejected, and a finalize
//! with no session open is rejected. Absorbing more chunks for the algorithm
//! that opened the session continues that session; that is what a multi-call
//! digest is.

use crate::engine::HashAlg;
use crate::error::TlsError;
use crate::provider::{CryptoProvider, DigestStream};

#[derive(Debug)]
struct OpenSession<D> {
    alg: HashAlg,
    stream: D,
}

#[derive(Debug)]
pub(crate) struct DigestAccumulator<D> {
    session: Option<OpenSession<D>>,
}

impl<D: DigestStream> DigestAccumulator<D> {
    pub(crate) fn new() -> Self {
        Self { session: None }
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Write one chunk, opening the provider-side session on first use.
    pub(crate) async fn absorb<P>(
        &mut self,
        provider: &mut P,
        alg: HashAlg,
        chunk: &[u8],
    ) -> Result<(), TlsError>
    where
        P: CryptoProvider<Digest = D>,
    {
        match &mut self.session {
            Some(open) if open.alg == alg => open
                .stream
                .write_chunk(chunk)
                .await
                .map_err(TlsError::Provider),
            Some(_) => Err(TlsError::DigestSessionBusy),
            None => {
                let mut stream = provider.open_digest(alg).await.map_err(TlsError::Provider)?;
                stream.write_chunk(chunk).await.map_err(TlsError::Provider)?;
                self.session = Some(OpenSession { alg, stream });
                Ok(())
            }
        }
    }

    /// Close the session and yield the digest; the slot is cleared even
    /// though the provider call may still fail.
    pub(crate) async fn finalize(&mut self, alg: HashAlg) -> Result<Vec<u8>, TlsError> {
        match self.session.take() {
            Some(open) if open.alg == alg => {
                open.stream.finish().await.map_err(TlsError::Provider)
            }
            Some(open) => {
                self.session = Some(open);
                Err(TlsError::DigestSessionBusy)
            }
            None => Err(TlsError::DigestSessionIdle),
        }
    }

    /// Drop any open session. Part of connection teardown; must be safe to
    /// call repeatedly and with nothing open.
    pub(crate) fn reset(&mut self) {
        self.session = None;
    }
}
