//! Transport bridge between the engine's blocking-style wire callbacks and
//! the asynchronous network provider.
//!
//! Each direction is a single buffer with two sides. The sync side is what
//! the engine sees: `io::Read`/`io::Write` that fail with `WouldBlock` when
//! the buffer cannot make progress. The async side (`do_io`) is where the
//! driver actually suspends on the transport. Nothing is buffered across
//! calls beyond these declared buffers, and no internal retries happen here.

use std::{
    cell::UnsafeCell,
    io::{self, Read, Write},
    mem,
    rc::Rc,
};

use bytes::{Buf, BytesMut};
use monoio::io::{AsyncReadRent, AsyncWriteRent, AsyncWriteRentExt};

pub(crate) const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug)]
enum ReadStatus {
    Ok,
    Eof,
    Err(io::Error),
}

/// Inbound half: transport bytes waiting for the engine.
#[derive(Debug)]
pub struct ReadBuffer {
    buf: BytesMut,
    capacity: usize,
    status: ReadStatus,
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl ReadBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            status: ReadStatus::Ok,
        }
    }

    /// Suspend on the transport until it produces bytes, closes (`Ok(0)`) or
    /// fails. If buffered data is already present, returns immediately.
    pub async fn do_io<IO: AsyncReadRent>(&mut self, io: &mut IO) -> io::Result<usize> {
        if !self.buf.is_empty() {
            return Ok(self.buf.len());
        }

        self.buf.reserve(self.capacity);
        let inner = mem::take(&mut self.buf);
        let (result, inner) = io.read(inner).await;
        self.buf = inner;
        match result {
            Ok(0) => {
                self.status = ReadStatus::Eof;
                Ok(0)
            }
            Ok(n) => {
                self.status = ReadStatus::Ok;
                Ok(n)
            }
            Err(e) => {
                let out = io::Error::from(e.kind());
                self.status = ReadStatus::Err(e);
                Err(out)
            }
        }
    }
}

impl Read for ReadBuffer {
    /// Engine-facing read. Empty buffer means: report the last transport
    /// condition, or `WouldBlock` to request a `do_io` drive.
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            return match mem::replace(&mut self.status, ReadStatus::Ok) {
                ReadStatus::Eof => Ok(0),
                ReadStatus::Err(e) => Err(e),
                ReadStatus::Ok => Err(io::ErrorKind::WouldBlock.into()),
            };
        }

        let n = self.buf.len().min(out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(n)
    }
}

#[derive(Debug)]
enum WriteStatus {
    Ok,
    Err(io::Error),
}

/// Outbound half: engine bytes waiting for the transport.
#[derive(Debug)]
pub struct WriteBuffer {
    buf: BytesMut,
    capacity: usize,
    status: WriteStatus,
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl WriteBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            status: WriteStatus::Ok,
        }
    }

    /// Hand everything buffered to the transport. Short writes are the
    /// transport's `write_all` business; a failure is recorded and replayed
    /// to the engine on its next write.
    pub async fn do_io<IO: AsyncWriteRent>(&mut self, io: &mut IO) -> io::Result<usize> {
        if self.buf.is_empty() {
            return Ok(0);
        }

        let inner = mem::take(&mut self.buf);
        let (result, mut inner) = io.write_all(inner).await;
        match result {
            Ok(n) => {
                inner.clear();
                self.buf = inner;
                Ok(n)
            }
            Err(e) => {
                self.buf = inner;
                let out = io::Error::from(e.kind());
                self.status = WriteStatus::Err(e);
                Err(out)
            }
        }
    }
}

impl Write for WriteBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match mem::replace(&mut self.status, WriteStatus::Ok) {
            WriteStatus::Err(e) => return Err(e),
            WriteStatus::Ok if self.buf.len() >= self.capacity => {
                return Err(io::ErrorKind::WouldBlock.into())
            }
            WriteStatus::Ok => (),
        }

        let room = self.capacity - self.buf.len();
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match mem::replace(&mut self.status, WriteStatus::Ok) {
            WriteStatus::Err(e) => Err(e),
            WriteStatus::Ok if !self.buf.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
            WriteStatus::Ok => Ok(()),
        }
    }
}

/// The engine's view of the wire: shared handles onto the two bridge
/// buffers. Single-threaded by construction, so `Rc<UnsafeCell<..>>` in the
/// established pattern; the engine and the driver never run concurrently.
#[derive(Debug, Clone)]
pub struct WireHandle {
    rd: Rc<UnsafeCell<ReadBuffer>>,
    wr: Rc<UnsafeCell<WriteBuffer>>,
}

impl Read for WireHandle {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        unsafe { &mut *self.rd.get() }.read(buf)
    }
}

impl Write for WireHandle {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        unsafe { &mut *self.wr.get() }.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        unsafe { &mut *self.wr.get() }.flush()
    }
}

/// Driver side of the bridge: owns the transport plus the same buffers the
/// engine holds a [`WireHandle`] onto.
#[derive(Debug)]
pub struct IoBridge<IO> {
    io: IO,
    rd: Rc<UnsafeCell<ReadBuffer>>,
    wr: Rc<UnsafeCell<WriteBuffer>>,
}

impl<IO> IoBridge<IO> {
    pub fn new(io: IO, read_capacity: Option<usize>, write_capacity: Option<usize>) -> Self {
        let rd = match read_capacity {
            Some(c) => ReadBuffer::new(c),
            None => ReadBuffer::default(),
        };
        let wr = match write_capacity {
            Some(c) => WriteBuffer::new(c),
            None => WriteBuffer::default(),
        };
        Self {
            io,
            rd: Rc::new(UnsafeCell::new(rd)),
            wr: Rc::new(UnsafeCell::new(wr)),
        }
    }

    pub fn wire(&self) -> WireHandle {
        WireHandle {
            rd: self.rd.clone(),
            wr: self.wr.clone(),
        }
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

impl<IO: AsyncReadRent> IoBridge<IO> {
    /// Fill the read buffer from the transport. `Ok(0)` means the transport
    /// closed; callers map that to `ConnectionClosed`, never to a
    /// zero-length success.
    #[inline]
    pub async fn read_wire(&mut self) -> io::Result<usize> {
        unsafe { &mut *self.rd.get() }.do_io(&mut self.io).await
    }
}

impl<IO: AsyncWriteRent> IoBridge<IO> {
    /// Drain the write buffer into the transport.
    #[inline]
    pub async fn write_wire(&mut self) -> io::Result<usize> {
        unsafe { &mut *self.wr.get() }.do_io(&mut self.io).await
    }

    #[inline]
    pub async fn shutdown_io(&mut self) -> io::Result<()> {
        self.io.shutdown().await
    }
}
