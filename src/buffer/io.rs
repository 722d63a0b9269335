//! Channel binding: fill on read shortage, flush on write overflow

use super::Buffer;
use crate::channel::Channel;
use crate::config::BufferConfig;
use crate::error::{Error, Result};
use std::io;
use std::mem;
use tracing::{debug, trace};

/// Bound channel plus the scratch space reads land in before being appended
pub(super) struct IoBinding {
    pub(super) channel: Box<dyn Channel>,
    pub(super) scratch: Vec<u8>,
}

impl Buffer {
    /// Create an empty buffer bound to `channel`
    pub fn with_channel<C: Channel + 'static>(config: BufferConfig, channel: C) -> Self {
        let mut buffer = Self::with_config(config);
        buffer.bind_channel(channel);
        buffer
    }

    /// Bind `channel`, returning the previously bound one
    pub fn bind_channel<C: Channel + 'static>(&mut self, channel: C) -> Option<Box<dyn Channel>> {
        let previous = self.io.replace(IoBinding {
            channel: Box::new(channel),
            scratch: Vec::new(),
        });
        previous.map(|io| io.channel)
    }

    pub fn unbind_channel(&mut self) -> Option<Box<dyn Channel>> {
        self.io.take().map(|io| io.channel)
    }

    pub fn is_bound(&self) -> bool {
        self.io.is_some()
    }

    /// Write buffered bytes to the bound channel
    ///
    /// With `consume` the written chunks are released and the buffer ends up
    /// empty; without it the buffer is left untouched. Returns the number of
    /// bytes written, `0` when no channel is bound.
    pub fn flush(&mut self, consume: bool) -> Result<usize> {
        let Some(mut binding) = self.io.take() else {
            return Ok(0);
        };
        let result = self.flush_to(binding.channel.as_mut(), consume);
        self.io = Some(binding);
        result
    }

    /// Write buffered bytes to `channel`, one write per non-empty chunk
    pub fn flush_to(&mut self, channel: &mut dyn Channel, consume: bool) -> Result<usize> {
        let mut written = 0;

        if consume {
            loop {
                let avail = self.top_readable_size();
                if avail > 0 {
                    channel.write_all(self.head_slice(avail))?;
                    written += avail;
                }
                if !self.shift_chunk() {
                    break;
                }
            }
        } else {
            let mut chunks = self.chunks.iter();
            if let Some(head) = chunks.next() {
                if self.read_pos < head.last {
                    channel.write_all(head.slice(self.read_pos, head.last))?;
                    written += head.last - self.read_pos;
                }
            }
            for chunk in chunks.filter(|c| c.len() > 0) {
                channel.write_all(chunk.readable())?;
                written += chunk.len();
            }
        }

        debug!(bytes = written, consume, "Flushed buffer");
        Ok(written)
    }

    /// Pull one `partial_read` worth of bytes from the channel
    ///
    /// Returns the number of bytes appended. End of stream (a zero-length
    /// read or `UnexpectedEof`) is reported as [`Error::EndOfStream`].
    pub fn fill_from_channel(&mut self) -> Result<usize> {
        let io_buffer_size = self.config.io_buffer_size;
        let binding = self.io.as_mut().ok_or(Error::NoChannel)?;

        let mut scratch = mem::take(&mut binding.scratch);
        scratch.resize(io_buffer_size, 0);
        let outcome = read_partial(binding.channel.as_mut(), &mut scratch);

        if let Ok(n) = &outcome {
            self.append_nonblock(&scratch[..*n]);
            trace!(bytes = n, "Filled buffer from channel");
        }
        if let Some(binding) = self.io.as_mut() {
            binding.scratch = scratch;
        }
        outcome
    }

    /// Fill `dest` straight from the channel, without staging in chunks
    ///
    /// Only valid while nothing is buffered. If the channel ends early the
    /// bytes that did arrive are appended to the buffer before the error is
    /// returned.
    pub(super) fn read_from_channel(&mut self, dest: &mut [u8]) -> Result<()> {
        let binding = self.io.as_mut().ok_or(Error::NoChannel)?;

        let mut done = 0;
        let mut failure = None;
        while done < dest.len() {
            match read_partial(binding.channel.as_mut(), &mut dest[done..]) {
                Ok(n) => done += n,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            self.append_nonblock(&dest[..done]);
            return Err(e);
        }
        trace!(bytes = done, "Read directly from channel");
        Ok(())
    }

    /// Discard `length` bytes from the channel through the scratch space
    ///
    /// Only valid while nothing is buffered. Bytes skipped before an early
    /// end of stream are gone.
    pub(super) fn skip_from_channel(&mut self, length: usize) -> Result<()> {
        let io_buffer_size = self.config.io_buffer_size;
        let binding = self.io.as_mut().ok_or(Error::NoChannel)?;

        let mut scratch = mem::take(&mut binding.scratch);
        scratch.resize(io_buffer_size, 0);

        let mut remaining = length;
        let mut outcome = Ok(());
        while remaining > 0 {
            let wanted = remaining.min(scratch.len());
            match read_partial(binding.channel.as_mut(), &mut scratch[..wanted]) {
                Ok(n) => remaining -= n,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        binding.scratch = scratch;

        trace!(bytes = length - remaining, "Skipped directly from channel");
        outcome
    }

    /// Whether a blocking read of `length` bytes should bypass the chunks
    pub(super) fn reads_directly(&self, length: usize) -> bool {
        self.io.is_some()
            && length >= self.config.io_buffer_size
            && self.all_readable_size() == 0
    }

    /// Make at least `length` bytes readable, filling from the channel
    pub fn ensure_readable(&mut self, length: usize) -> Result<()> {
        let mut available = self.all_readable_size();
        while available < length {
            if self.io.is_none() {
                return Err(Error::EndOfStream);
            }
            available += self.fill_from_channel()?;
        }
        Ok(())
    }

    pub(super) fn write_through(&mut self, data: &[u8]) -> Result<()> {
        let binding = self.io.as_mut().ok_or(Error::NoChannel)?;
        binding.channel.write_all(data)?;
        debug!(bytes = data.len(), "Wrote reference through to channel");
        Ok(())
    }
}

/// One `partial_read` into `buf`
///
/// A zero-length read or `UnexpectedEof` is end of stream. A channel that
/// claims more bytes than `buf` holds is rejected as `InvalidData`.
fn read_partial(channel: &mut dyn Channel, buf: &mut [u8]) -> Result<usize> {
    match channel.partial_read(buf) {
        Ok(0) => Err(Error::EndOfStream),
        Ok(n) if n > buf.len() => Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Channel reported {} bytes read into {} bytes", n, buf.len()),
        ))),
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::EndOfStream),
        Err(e) => Err(Error::Io(e)),
    }
}
