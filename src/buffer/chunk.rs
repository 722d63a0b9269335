//! Chunk: one contiguous extent of buffered bytes

use crate::slab::{PageLease, PAGE_SIZE};
use bytes::Bytes;
use std::fmt;
use std::ptr;
use std::slice;
use std::sync::Arc;

/// Memory behind a chunk
enum Backing {
    /// Unwritten tail
    Empty,
    /// Slab page, possibly shared with the chunk that wrote its beginning
    Page(Arc<PageLease>),
    /// General allocation for writes larger than a page
    Heap(Vec<u8>),
    /// Aliased external bytes; never written
    Mapped(Bytes),
}

/// Readable window `[first, last)` and capacity `end` over a backing.
///
/// Offsets index into the backing, so they stay valid when heap storage
/// moves. A chunk only ever writes to `[last, end)`; when a page is shared
/// with a later chunk, `end` is clamped first so the two regions never
/// overlap.
pub(crate) struct Chunk {
    pub(crate) first: usize,
    pub(crate) last: usize,
    pub(crate) end: usize,
    backing: Backing,
}

impl Chunk {
    pub(crate) fn empty() -> Self {
        Self {
            first: 0,
            last: 0,
            end: 0,
            backing: Backing::Empty,
        }
    }

    /// Writable page region starting at `offset`
    pub(crate) fn page(page: Arc<PageLease>, offset: usize) -> Self {
        debug_assert!(offset <= PAGE_SIZE);
        Self {
            first: offset,
            last: offset,
            end: PAGE_SIZE,
            backing: Backing::Page(page),
        }
    }

    pub(crate) fn heap(capacity: usize) -> Self {
        Self {
            first: 0,
            last: 0,
            end: capacity,
            backing: Backing::Heap(vec![0u8; capacity]),
        }
    }

    pub(crate) fn mapped(bytes: Bytes) -> Self {
        let len = bytes.len();
        Self {
            first: 0,
            last: len,
            end: len,
            backing: Backing::Mapped(bytes),
        }
    }

    /// Bytes written to this chunk
    pub(crate) fn len(&self) -> usize {
        self.last - self.first
    }

    pub(crate) fn writable(&self) -> usize {
        self.end - self.last
    }

    pub(crate) fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    pub(crate) fn mapped_bytes(&self) -> Option<&Bytes> {
        match &self.backing {
            Backing::Mapped(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Heap chunks past one page grow in place instead of linking a new chunk
    pub(crate) fn can_grow_in_place(&self) -> bool {
        matches!(self.backing, Backing::Heap(_)) && self.end - self.first > PAGE_SIZE
    }

    pub(crate) fn slice(&self, from: usize, to: usize) -> &[u8] {
        debug_assert!(self.first <= from && from <= to && to <= self.last);
        match &self.backing {
            Backing::Empty => &[],
            // SAFETY: [from, to) lies inside this chunk's written window of a
            // live page; no other chunk writes there.
            Backing::Page(page) => unsafe {
                slice::from_raw_parts(page.as_ptr().add(from), to - from)
            },
            Backing::Heap(mem) => &mem[from..to],
            Backing::Mapped(bytes) => &bytes[from..to],
        }
    }

    pub(crate) fn readable(&self) -> &[u8] {
        self.slice(self.first, self.last)
    }

    /// Append `data` into spare capacity. The caller checks `writable`.
    pub(crate) fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let start = self.last;
        let stop = start + data.len();
        assert!(stop <= self.end, "chunk overflow");

        match &mut self.backing {
            // SAFETY: [last, end) belongs exclusively to this chunk.
            Backing::Page(page) => unsafe {
                ptr::copy_nonoverlapping(data.as_ptr(), page.as_ptr().add(start), data.len());
            },
            Backing::Heap(mem) => mem[start..stop].copy_from_slice(data),
            Backing::Empty | Backing::Mapped(_) => unreachable!("chunk has no writable memory"),
        }
        self.last = stop;
    }

    /// Double heap capacity until `required_end` fits. Offsets are preserved.
    pub(crate) fn grow(&mut self, required_end: usize) {
        if let Backing::Heap(mem) = &mut self.backing {
            let mut next = mem.len().max(1) * 2;
            while next < required_end {
                next *= 2;
            }
            mem.resize(next, 0);
            self.end = next;
        }
    }

    /// Stop accepting writes; returns the page and offset of the spare part
    pub(crate) fn seal(&mut self) -> Option<(&Arc<PageLease>, usize)> {
        let spare = self.last;
        let had_spare = self.end > self.last;
        self.end = self.last;
        match &self.backing {
            Backing::Page(page) if had_spare => Some((page, spare)),
            _ => None,
        }
    }

    /// Zero-copy view of `[from, to)` when the chunk aliases shared bytes
    pub(crate) fn share(&self, from: usize, to: usize) -> Option<Bytes> {
        self.mapped_bytes().map(|bytes| bytes.slice(from..to))
    }

    /// `[from, last)` as an independent block, shared when possible
    pub(crate) fn to_bytes(&self, from: usize) -> Bytes {
        if from == self.last {
            return Bytes::new();
        }
        match self.share(from, self.last) {
            Some(shared) => shared,
            None => Bytes::copy_from_slice(self.slice(from, self.last)),
        }
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.backing {
            Backing::Empty => "empty",
            Backing::Page(_) => "page",
            Backing::Heap(_) => "heap",
            Backing::Mapped(_) => "mapped",
        };
        f.debug_struct("Chunk")
            .field("kind", &kind)
            .field("first", &self.first)
            .field("last", &self.last)
            .field("end", &self.end)
            .finish()
    }
}
