//! Chunk list: arena of chunk slots linked from head to tail
//!
//! ```text
//!   head                              tail
//!    ↓                                 ↓
//! [slot 2] ──next──→ [slot 0] ──next──→ [slot 3]
//!
//! free: [slot 1] ──next──→ None
//! ```
//!
//! The tail slot always exists. `head == tail` with an unwritten tail is
//! the empty list. Retired slots go on the free list and are handed out
//! again before the arena grows.

use super::chunk::Chunk;

struct Slot {
    chunk: Chunk,
    next: Option<usize>,
}

pub(crate) struct ChunkList {
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
    free: Option<usize>,
}

impl ChunkList {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![Slot {
                chunk: Chunk::empty(),
                next: None,
            }],
            head: 0,
            tail: 0,
            free: None,
        }
    }

    pub(crate) fn head(&self) -> &Chunk {
        &self.slots[self.head].chunk
    }

    pub(crate) fn tail(&self) -> &Chunk {
        &self.slots[self.tail].chunk
    }

    pub(crate) fn tail_mut(&mut self) -> &mut Chunk {
        &mut self.slots[self.tail].chunk
    }

    /// True when the head is also the tail
    pub(crate) fn is_single(&self) -> bool {
        self.head == self.tail
    }

    /// Chunks from head to tail inclusive
    pub(crate) fn iter(&self) -> Chunks<'_> {
        Chunks {
            list: self,
            next: Some(self.head),
        }
    }

    /// Make room for a new tail chunk
    ///
    /// An unwritten tail is reused in place; otherwise a slot is taken from
    /// the free list (or the arena grows) and linked after the tail.
    pub(crate) fn push_tail(&mut self) {
        if self.tail().len() == 0 {
            self.slots[self.tail].chunk = Chunk::empty();
            return;
        }

        let index = self.alloc_slot();
        self.slots[self.tail].next = Some(index);
        self.tail = index;
    }

    fn alloc_slot(&mut self) -> usize {
        match self.free {
            Some(index) => {
                self.free = self.slots[index].next.take();
                index
            }
            None => {
                self.slots.push(Slot {
                    chunk: Chunk::empty(),
                    next: None,
                });
                self.slots.len() - 1
            }
        }
    }

    /// Drop the head chunk's memory and advance
    ///
    /// Returns `false` when the head was the tail: the tail is reset to
    /// empty and stays in place.
    pub(crate) fn shift(&mut self) -> bool {
        let head = self.head;
        self.slots[head].chunk = Chunk::empty();

        if head == self.tail {
            return false;
        }

        let next = self.slots[head]
            .next
            .expect("chunk before tail must be linked");
        self.slots[head].next = self.free;
        self.free = Some(head);
        self.head = next;
        true
    }

    /// Number of chunks from head to tail
    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }

    /// Retired slots waiting for reuse
    pub(crate) fn free_slots(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free;
        while let Some(index) = cursor {
            count += 1;
            cursor = self.slots[index].next;
        }
        count
    }
}

pub(crate) struct Chunks<'a> {
    list: &'a ChunkList,
    next: Option<usize>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a Chunk;

    fn next(&mut self) -> Option<&'a Chunk> {
        let index = self.next?;
        let slot = &self.list.slots[index];
        self.next = if index == self.list.tail {
            None
        } else {
            slot.next
        };
        Some(&slot.chunk)
    }
}
