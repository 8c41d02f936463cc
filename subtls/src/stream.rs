use std::io;

use monoio::{
    buf::{IoBuf, IoBufMut, IoVecBuf, IoVecBufMut, RawBuf},
    io::{AsyncReadRent, AsyncWriteRent},
    BufResult,
};
use tracing::warn;

use crate::bridge::IoBridge;
use crate::engine::{Step, TlsEngine, Want};
use crate::error::{EngineError, TlsError};
use crate::offload::OffloadDispatcher;
use crate::provider::CryptoProvider;

/// Drive one engine operation to completion, suspending on the transport
/// bridge for wire I/O and on the offload dispatcher for crypto.
///
/// Ordering is strictly sequential: the engine is re-entered only after the
/// suspended operation's continuation has run. There is no cancellation and
/// no timeout at this layer.
pub(crate) async fn drive<IO, E, P, T>(
    engine: &mut E,
    io: &mut IoBridge<IO>,
    offload: &mut OffloadDispatcher<P>,
    mut step: impl FnMut(&mut E) -> Result<Step<T>, EngineError>,
) -> Result<T, TlsError>
where
    IO: AsyncReadRent + AsyncWriteRent,
    E: TlsEngine,
    P: CryptoProvider,
{
    loop {
        match step(engine)? {
            Step::Done(value) => {
                // flush whatever the engine queued before reporting done
                io.write_wire().await?;
                return Ok(value);
            }
            Step::Io(Want::Write) => {
                io.write_wire().await?;
            }
            Step::Io(Want::Read) => {
                // our side goes out first so the peer has something to
                // answer, then suspend on the transport
                io.write_wire().await?;
                if io.read_wire().await? == 0 {
                    return Err(TlsError::ConnectionClosed);
                }
            }
            Step::Crypto(request) => {
                let done = offload.dispatch(request).await?;
                engine.resume_crypto(done)?;
            }
        }
    }
}

/// An established TLS connection: the engine, its transport bridge and its
/// crypto-offload dispatcher, owned together.
///
/// Bytes read are decrypted from the wrapped transport, bytes written are
/// encrypted into it. Record-layer calls re-enter the bridge and the
/// dispatcher exactly like the handshake did.
pub struct TlsStream<IO, E, P: CryptoProvider> {
    pub(crate) engine: E,
    pub(crate) io: IoBridge<IO>,
    pub(crate) offload: OffloadDispatcher<P>,
    pub(crate) shut: bool,
}

impl<IO, E, P: CryptoProvider> std::fmt::Debug for TlsStream<IO, E, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream")
            .field("shut", &self.shut)
            .finish_non_exhaustive()
    }
}

impl<IO, E, P: CryptoProvider> TlsStream<IO, E, P> {
    pub fn into_inner(self) -> IO {
        self.io.into_inner()
    }
}

impl<IO, E, P> TlsStream<IO, E, P>
where
    IO: AsyncReadRent + AsyncWriteRent,
    E: TlsEngine,
    P: CryptoProvider,
{
    /// Read decrypted application data. Fails after `shutdown`; transport
    /// EOF surfaces as [`TlsError::ConnectionClosed`].
    pub async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, TlsError> {
        if self.shut {
            return Err(TlsError::ConnectionClosed);
        }
        drive(&mut self.engine, &mut self.io, &mut self.offload, |e| {
            e.drive_read(buf)
        })
        .await
    }

    /// Encrypt and send application data. A short write is reported to the
    /// caller and logged, never retried here.
    pub async fn write_data(&mut self, buf: &[u8]) -> Result<usize, TlsError> {
        if self.shut {
            return Err(TlsError::ConnectionClosed);
        }
        let n = drive(&mut self.engine, &mut self.io, &mut self.offload, |e| {
            e.drive_write(buf)
        })
        .await?;
        if n != buf.len() {
            warn!(requested = buf.len(), written = n, "short record write");
        }
        Ok(n)
    }

    /// Decrypted bytes already buffered in the engine.
    pub fn pending(&self) -> usize {
        self.engine.pending()
    }

    /// Send the close alert and shut the transport down. Idempotent.
    pub async fn shutdown_tls(&mut self) -> Result<(), TlsError> {
        if self.shut {
            return Ok(());
        }
        drive(&mut self.engine, &mut self.io, &mut self.offload, |e| {
            e.drive_shutdown()
        })
        .await?;
        self.shut = true;
        self.offload.reset();
        self.io.shutdown_io().await?;
        Ok(())
    }
}

impl<IO, E, P> AsyncReadRent for TlsStream<IO, E, P>
where
    IO: AsyncReadRent + AsyncWriteRent,
    E: TlsEngine,
    P: CryptoProvider,
{
    async fn read<T: IoBufMut>(&mut self, mut buf: T) -> BufResult<usize, T> {
        let slice = unsafe { std::slice::from_raw_parts_mut(buf.write_ptr(), buf.bytes_total()) };
        match self.read_data(slice).await {
            Ok(n) => {
                unsafe { buf.set_init(n) };
                (Ok(n), buf)
            }
            Err(e) => (Err(e.into()), buf),
        }
    }

    async fn readv<T: IoVecBufMut>(&mut self, mut buf: T) -> BufResult<usize, T> {
        let n = match unsafe { RawBuf::new_from_iovec_mut(&mut buf) } {
            Some(raw_buf) => self.read(raw_buf).await.0,
            None => Ok(0),
        };
        if let Ok(n) = n {
            unsafe { buf.set_init(n) };
        }
        (n, buf)
    }
}

impl<IO, E, P> AsyncWriteRent for TlsStream<IO, E, P>
where
    IO: AsyncReadRent + AsyncWriteRent,
    E: TlsEngine,
    P: CryptoProvider,
{
    async fn write<T: IoBuf>(&mut self, buf: T) -> BufResult<usize, T> {
        let slice = unsafe { std::slice::from_raw_parts(buf.read_ptr(), buf.bytes_init()) };
        match self.write_data(slice).await {
            Ok(n) => (Ok(n), buf),
            Err(e) => (Err(e.into()), buf),
        }
    }

    async fn writev<T: IoVecBuf>(&mut self, buf_vec: T) -> BufResult<usize, T> {
        let n = match unsafe { RawBuf::new_from_iovec(&buf_vec) } {
            Some(raw_buf) => self.write(raw_buf).await.0,
            None => Ok(0),
        };
        (n, buf_vec)
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.io.write_wire().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.shutdown_tls().await.map_err(io::Error::from)
    }
}
