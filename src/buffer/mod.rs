//! Chunked streaming buffer
//!
//! # Architecture
//!
//! ```text
//! Buffer
//!   ├─→ ChunkList   head ─→ [page "abc"] ─→ [mapped 5 KB] ─→ [page "de|...."] ← tail
//!   │                        ↑ read_pos                               ↑ last  ↑ end
//!   ├─→ PagePool    4 KB pages for small chunks (shared, mutex-guarded)
//!   └─→ Channel     optional: fill on read shortage, flush on write overflow
//! ```
//!
//! Writes go to the tail chunk. When it is full the buffer either grows it
//! (heap chunks past one page), or links a new chunk backed by a page, a
//! heap allocation, or a shared `Bytes` reference. Reads consume from the
//! head; exhausted chunks are shifted off and their slots recycled.
//!
//! A buffer is single-threaded: it has no interior locking.

mod chunk;
mod export;
mod io;
mod list;
mod source;
mod write;

pub use export::ExportStats;
pub use source::ShareableBytes;

use self::chunk::Chunk;
use self::io::IoBinding;
use self::list::ChunkList;
use crate::channel::Channel;
use crate::config::BufferConfig;
use crate::error::Result;
use crate::slab::{PageLease, PagePool};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};

/// Unused end of the last page a tail chunk wrote into
struct Remnant {
    page: Weak<PageLease>,
    offset: usize,
}

/// Streaming byte buffer built from a list of chunks
pub struct Buffer {
    chunks: ChunkList,
    /// Offset of the next unread byte inside the head chunk
    read_pos: usize,
    remnant: Option<Remnant>,
    pool: Arc<PagePool>,
    config: BufferConfig,
    io: Option<IoBinding>,
}

impl Buffer {
    /// Create an empty buffer with default settings
    pub fn new() -> Self {
        Self::with_config(BufferConfig::default())
    }

    /// Create an empty buffer drawing pages from the global pool
    pub fn with_config(config: BufferConfig) -> Self {
        Self::with_pool(config, PagePool::global())
    }

    /// Create an empty buffer drawing pages from `pool`
    pub fn with_pool(config: BufferConfig, pool: Arc<PagePool>) -> Self {
        Self {
            chunks: ChunkList::new(),
            read_pos: 0,
            remnant: None,
            pool,
            config: config.normalized(),
            io: None,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Unread bytes in the head chunk
    pub fn top_readable_size(&self) -> usize {
        self.chunks.head().last - self.read_pos
    }

    /// Unread bytes across every chunk
    ///
    /// Walks the whole chunk list.
    pub fn all_readable_size(&self) -> usize {
        let mut chunks = self.chunks.iter();
        chunks.next();
        self.top_readable_size() + chunks.map(Chunk::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.top_readable_size() == 0
    }

    /// Copy up to `out.len()` buffered bytes; returns how many were copied
    ///
    /// Never touches the channel.
    pub fn read_nonblock(&mut self, out: &mut [u8]) -> usize {
        let mut filled = 0;
        self.consume_with(out.len(), |part| {
            out[filled..filled + part.len()].copy_from_slice(part);
            filled += part.len();
        })
    }

    /// Discard up to `length` buffered bytes; returns how many were skipped
    pub fn skip_nonblock(&mut self, length: usize) -> usize {
        self.consume_with(length, |_| {})
    }

    /// Append up to `length` buffered bytes to `dest`
    pub fn read_to_vec_nonblock(&mut self, dest: &mut Vec<u8>, length: usize) -> usize {
        self.consume_with(length, |part| dest.extend_from_slice(part))
    }

    /// Take up to `length` buffered bytes as an independent block
    ///
    /// When the head chunk aliases shared bytes, holds the whole request and
    /// the request meets the read reference threshold, the result is a slice
    /// of that reference rather than a copy.
    pub fn read_bytes_nonblock(&mut self, length: usize) -> Bytes {
        if length >= self.config.read_reference_threshold && length <= self.top_readable_size() {
            let shared = self
                .chunks
                .head()
                .share(self.read_pos, self.read_pos + length);
            if let Some(shared) = shared {
                self.consumed(length);
                return shared;
            }
        }

        let mut out = Vec::with_capacity(length.min(self.all_readable_size()));
        self.read_to_vec_nonblock(&mut out, length);
        Bytes::from(out)
    }

    /// Fill `out` completely, pulling from the channel if needed
    ///
    /// With nothing buffered, a request of at least `io_buffer_size` bytes is
    /// read from the channel straight into `out`.
    pub fn read_all(&mut self, out: &mut [u8]) -> Result<()> {
        if self.reads_directly(out.len()) {
            return self.read_from_channel(out);
        }
        self.ensure_readable(out.len())?;
        self.read_nonblock(out);
        Ok(())
    }

    /// Discard exactly `length` bytes, pulling from the channel if needed
    pub fn skip_all(&mut self, length: usize) -> Result<()> {
        if self.reads_directly(length) {
            return self.skip_from_channel(length);
        }
        self.ensure_readable(length)?;
        self.skip_nonblock(length);
        Ok(())
    }

    /// Append exactly `length` bytes to `dest`, pulling from the channel if needed
    ///
    /// On error `dest` is left as it was.
    pub fn read_to_vec(&mut self, dest: &mut Vec<u8>, length: usize) -> Result<()> {
        if self.reads_directly(length) {
            let start = dest.len();
            dest.resize(start + length, 0);
            let result = self.read_from_channel(&mut dest[start..]);
            if result.is_err() {
                dest.truncate(start);
            }
            return result;
        }
        self.ensure_readable(length)?;
        self.read_to_vec_nonblock(dest, length);
        Ok(())
    }

    /// Read exactly `length` bytes, pulling from the channel if needed
    pub fn read_bytes(&mut self, length: usize) -> Result<Bytes> {
        if self.reads_directly(length) {
            let mut out = vec![0u8; length];
            self.read_from_channel(&mut out)?;
            return Ok(Bytes::from(out));
        }
        self.ensure_readable(length)?;
        Ok(self.read_bytes_nonblock(length))
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self.peek_byte()?;
        self.consumed(1);
        Ok(byte)
    }

    /// Next byte without consuming it
    pub fn peek_byte(&mut self) -> Result<u8> {
        self.ensure_readable(1)?;
        Ok(self.head_slice(1)[0])
    }

    /// Drop every buffered byte
    pub fn clear(&mut self) {
        while self.shift_chunk() {}
    }

    /// Chunk and memory usage
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            chunks: self.chunks.len(),
            mapped_chunks: self.chunks.iter().filter(|c| c.is_mapped()).count(),
            free_slots: self.chunks.free_slots(),
            readable_bytes: self.all_readable_size(),
            writable_bytes: self.writable_size(),
        }
    }

    /// Every external reference the buffer keeps alive
    ///
    /// One entry per chunk aliasing shared bytes, then the bound channel and
    /// its scratch space.
    pub fn live_references(&self) -> impl Iterator<Item = LiveReference<'_>> + '_ {
        let mapped = self
            .chunks
            .iter()
            .filter_map(Chunk::mapped_bytes)
            .map(LiveReference::Chunk);
        let io = self.io.iter().flat_map(|io| {
            [
                LiveReference::Channel(io.channel.as_ref()),
                LiveReference::Scratch(&io.scratch),
            ]
        });
        mapped.chain(io)
    }

    fn head_slice(&self, length: usize) -> &[u8] {
        self.chunks
            .head()
            .slice(self.read_pos, self.read_pos + length)
    }

    /// Advance the read cursor, shifting the head once it is exhausted
    fn consumed(&mut self, length: usize) {
        if length == 0 {
            return;
        }
        self.read_pos += length;
        if self.read_pos >= self.chunks.head().last {
            self.shift_chunk();
        }
    }

    /// Retire the head chunk; `false` once the buffer is empty
    fn shift_chunk(&mut self) -> bool {
        let more = self.chunks.shift();
        self.read_pos = self.chunks.head().first;
        more
    }

    fn consume_with(&mut self, length: usize, mut sink: impl FnMut(&[u8])) -> usize {
        let mut done = 0;
        loop {
            let avail = self.top_readable_size();
            let wanted = length - done;

            if wanted <= avail {
                sink(self.head_slice(wanted));
                self.consumed(wanted);
                return length;
            }

            sink(self.head_slice(avail));
            done += avail;

            if avail == 0 && self.chunks.is_single() {
                return done;
            }
            if !self.shift_chunk() {
                return done;
            }
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("stats", &self.stats())
            .field("read_pos", &self.read_pos)
            .field("config", &self.config)
            .field("bound", &self.io.is_some())
            .finish()
    }
}

/// Buffer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub chunks: usize,
    pub mapped_chunks: usize,
    pub free_slots: usize,
    pub readable_bytes: usize,
    pub writable_bytes: usize,
}

/// Reference held by a buffer, for external tracers
pub enum LiveReference<'a> {
    /// Shared bytes aliased by a chunk
    Chunk(&'a Bytes),
    /// Bound channel
    Channel(&'a dyn Channel),
    /// Scratch space used for channel reads
    Scratch(&'a [u8]),
}
