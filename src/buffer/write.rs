//! Write side: appends, reservations and chunk allocation

use super::chunk::Chunk;
use super::source::ShareableBytes;
use super::{Buffer, Remnant};
use crate::error::Result;
use crate::slab::PAGE_SIZE;
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

impl Buffer {
    /// Spare capacity in the tail chunk
    pub fn writable_size(&self) -> usize {
        self.chunks.tail().writable()
    }

    /// Append a copy of `data`
    ///
    /// When the tail is full and a channel is bound, buffered bytes are
    /// flushed to it first.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() <= self.writable_size() {
            self.chunks.tail_mut().write(data);
            return Ok(());
        }
        self.expand(Some(data), data.len(), true)
    }

    /// Append a copy of `data` without ever touching the channel
    pub fn append_nonblock(&mut self, data: &[u8]) {
        if data.len() <= self.writable_size() {
            self.chunks.tail_mut().write(data);
            return;
        }
        self.expand_local(Some(data), data.len());
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.append(&[byte])
    }

    /// Guarantee at least `length` bytes of contiguous tail capacity
    pub fn ensure_writable(&mut self, length: usize) -> Result<()> {
        if self.writable_size() >= length {
            return Ok(());
        }
        self.expand(None, length, true)
    }

    /// Append `source`, keeping a reference instead of a copy when allowed
    ///
    /// Sources below the write reference threshold are always copied. At or
    /// above it, a bound channel gets the buffered bytes and then `source`
    /// written straight through; otherwise a shareable source is linked in
    /// as its own chunk.
    pub fn append_reference<S: ShareableBytes + ?Sized>(&mut self, source: &S) -> Result<()> {
        let data = source.as_slice();
        if data.len() < self.config.write_reference_threshold {
            return self.append(data);
        }

        if self.io.is_some() {
            self.flush(true)?;
            return self.write_through(data);
        }

        match source.share() {
            Some(shared) => {
                self.append_mapped(shared);
                Ok(())
            }
            None => self.append(data),
        }
    }

    pub fn append_bytes(&mut self, bytes: Bytes) -> Result<()> {
        self.append_reference(&bytes)
    }

    fn append_mapped(&mut self, bytes: Bytes) {
        let len = bytes.len();
        self.add_new_chunk();
        *self.chunks.tail_mut() = Chunk::mapped(bytes);
        if self.chunks.is_single() {
            self.read_pos = self.chunks.head().first;
        }
        trace!(bytes = len, "Linked shared chunk");
    }

    /// Seal the tail and make room for its successor
    ///
    /// Spare page space behind the sealed tail is remembered so the next
    /// small chunk can continue in the same page.
    fn add_new_chunk(&mut self) {
        if let Some((page, offset)) = self.chunks.tail_mut().seal() {
            self.remnant = Some(Remnant {
                page: Arc::downgrade(page),
                offset,
            });
        }
        self.chunks.push_tail();
    }

    /// Memory for a chunk that must hold at least `required` bytes
    fn allocate_chunk(&mut self, required: usize) -> Chunk {
        if required > PAGE_SIZE {
            trace!(bytes = required, "Allocating heap chunk");
            return Chunk::heap(required);
        }

        if let Some(remnant) = self.remnant.take() {
            if PAGE_SIZE - remnant.offset >= required {
                if let Some(page) = remnant.page.upgrade() {
                    trace!(offset = remnant.offset, "Reusing page remnant");
                    return Chunk::page(page, remnant.offset);
                }
            }
        }

        Chunk::page(Arc::new(self.pool.lease()), 0)
    }

    fn expand(&mut self, data: Option<&[u8]>, length: usize, flush_to_io: bool) -> Result<()> {
        if flush_to_io && self.io.is_some() {
            self.flush(true)?;
            if self.writable_size() >= length {
                if let Some(data) = data {
                    self.chunks.tail_mut().write(data);
                }
                return Ok(());
            }
        }
        self.expand_local(data, length);
        Ok(())
    }

    /// Make room for `length` more bytes, writing `data` if given
    ///
    /// The tail is filled first. The rest goes into the grown tail or into
    /// a freshly linked chunk.
    fn expand_local(&mut self, data: Option<&[u8]>, length: usize) {
        let (rest, remaining) = match data {
            Some(data) => {
                let split = self.writable_size().min(data.len());
                let (now, rest) = data.split_at(split);
                self.chunks.tail_mut().write(now);
                (Some(rest), rest.len())
            }
            None => (None, length),
        };

        if self.chunks.tail().can_grow_in_place() {
            let tail = self.chunks.tail_mut();
            let required_end = tail.last + remaining;
            tail.grow(required_end);
            if let Some(rest) = rest {
                tail.write(rest);
            }
            trace!(capacity = tail.end - tail.first, "Grew tail chunk");
            return;
        }

        self.add_new_chunk();
        let chunk = self.allocate_chunk(remaining);
        let tail = self.chunks.tail_mut();
        *tail = chunk;
        if let Some(rest) = rest {
            tail.write(rest);
        }
        if self.chunks.is_single() {
            self.read_pos = self.chunks.head().first;
        }
    }
}
