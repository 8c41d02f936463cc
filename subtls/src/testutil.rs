//! In-memory transport used by the workspace's test suites.
//!
//! Reads are scripted: each queued chunk resolves one transport read, and an
//! exhausted queue reads as a closed connection (`Ok(0)`). Writes append to
//! `written`. This mirrors the one-message-per-wakeup behaviour of a real
//! asynchronous network provider without any sockets.

use std::collections::VecDeque;
use std::io;

use monoio::{
    buf::{IoBuf, IoBufMut, IoVecBuf, IoVecBufMut},
    io::{AsyncReadRent, AsyncWriteRent},
    BufResult,
};

#[derive(Debug, Default)]
pub struct MemoryIo {
    pub incoming: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    /// Error the transport reports once the scripted chunks are exhausted,
    /// once. `None` means the queue drains into a clean close (`Ok(0)`).
    pub read_error: Option<io::ErrorKind>,
    /// Error to fail the next write with, once.
    pub write_error: Option<io::ErrorKind>,
    pub shutdown_calls: usize,
}

impl MemoryIo {
    pub fn with_incoming(incoming: Vec<Vec<u8>>) -> Self {
        Self {
            incoming: incoming.into(),
            ..Default::default()
        }
    }

    pub fn failing_read(kind: io::ErrorKind) -> Self {
        Self {
            read_error: Some(kind),
            ..Default::default()
        }
    }

    /// Queue another chunk after construction.
    pub fn push_incoming(&mut self, chunk: impl Into<Vec<u8>>) {
        self.incoming.push_back(chunk.into());
    }
}

impl AsyncReadRent for MemoryIo {
    async fn read<T: IoBufMut>(&mut self, mut buf: T) -> BufResult<usize, T> {
        let Some(mut chunk) = self.incoming.pop_front() else {
            if let Some(kind) = self.read_error.take() {
                return (Err(kind.into()), buf);
            }
            return (Ok(0), buf);
        };
        let n = chunk.len().min(buf.bytes_total());
        if n < chunk.len() {
            // leftover bytes stay queued for the next read
            self.incoming.push_front(chunk.split_off(n));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(chunk.as_ptr(), buf.write_ptr(), n);
            buf.set_init(n);
        }
        (Ok(n), buf)
    }

    async fn readv<T: IoVecBufMut>(&mut self, buf: T) -> BufResult<usize, T> {
        // not exercised by the bridge
        (Ok(0), buf)
    }
}

impl AsyncWriteRent for MemoryIo {
    async fn write<T: IoBuf>(&mut self, buf: T) -> BufResult<usize, T> {
        if let Some(kind) = self.write_error.take() {
            return (Err(kind.into()), buf);
        }
        let slice = unsafe { std::slice::from_raw_parts(buf.read_ptr(), buf.bytes_init()) };
        self.written.extend_from_slice(slice);
        (Ok(slice.len()), buf)
    }

    async fn writev<T: IoVecBuf>(&mut self, buf_vec: T) -> BufResult<usize, T> {
        // not exercised by the bridge
        (Ok(0), buf_vec)
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.shutdown_calls += 1;
        Ok(())
    }
}
