//! I/O channel contract
//!
//! A buffer bound to a [`Channel`] refills itself through
//! [`partial_read`](Channel::partial_read) and flushes through
//! [`write_all`](Channel::write_all). Both calls are synchronous; a channel
//! that blocks blocks the buffer.

use std::io::{self, Read, Write};

/// Byte-oriented read/write endpoint a buffer can be bound to
pub trait Channel {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn partial_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write every byte of `data`
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Channel over a duplex `Read + Write` value (sockets, `Cursor`, ...)
#[derive(Debug)]
pub struct IoChannel<T> {
    inner: T,
}

impl<T: Read + Write> IoChannel<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write> Channel for IoChannel<T> {
    fn partial_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)?;
        self.inner.flush()
    }
}

/// Read-only channel; writes fail with `Unsupported`
#[derive(Debug)]
pub struct ReadChannel<R> {
    inner: R,
}

impl<R: Read> ReadChannel<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Channel for ReadChannel<R> {
    fn partial_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write_all(&mut self, _data: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "channel is read-only",
        ))
    }
}

/// Write-only channel; reads fail with `Unsupported`
#[derive(Debug)]
pub struct WriteChannel<W> {
    inner: W,
}

impl<W: Write> WriteChannel<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Channel for WriteChannel<W> {
    fn partial_read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "channel is write-only",
        ))
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_io_channel_roundtrip() -> io::Result<()> {
        let mut channel = IoChannel::new(Cursor::new(Vec::new()));
        channel.write_all(b"hello")?;
        assert_eq!(channel.get_ref().get_ref(), b"hello");

        let mut cursor = channel.into_inner();
        cursor.set_position(0);
        let mut channel = IoChannel::new(cursor);
        let mut buf = [0u8; 8];
        assert_eq!(channel.partial_read(&mut buf)?, 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(channel.partial_read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn test_read_channel_rejects_writes() {
        let mut channel = ReadChannel::new(&b"abc"[..]);
        let err = channel.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_write_channel_rejects_reads() {
        let mut channel = WriteChannel::new(Vec::new());
        let mut buf = [0u8; 4];
        let err = channel.partial_read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        channel.write_all(b"ok").unwrap();
        assert_eq!(channel.into_inner(), b"ok");
    }
}
