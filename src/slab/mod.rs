//! Slab Allocator
//!
//! Hands out fixed-size memory pages to buffer chunks and takes them back,
//! amortizing `malloc`/`free` across many buffers.
//!
//! # Architecture
//!
//! ```text
//! PagePool (Mutex)
//!   └─→ SlabAllocator
//!        ├─→ slabs[0]  head cache   mask 0b...1111_0000  (4 pages out)
//!        ├─→ slabs[1]               mask 0b...0000_0000  (full)
//!        └─→ slabs[2]  reserve      mask 0b...1111_1111  (empty)
//!
//! Slab = 32 × 4 KB pages in one allocation, one bit per page (1 = free)
//! ```
//!
//! Allocation tries the head slab, then scans for any slab with a free bit
//! and swaps it to the head. Release searches the most recent slabs first.
//! A slab that becomes fully free is returned to the system, unless it is the
//! only slab or sits at the head; a head slab moves to the end as a reserve.

pub mod allocator;
pub mod page;

pub use allocator::{SlabAllocator, SlabStats, PAGES_PER_SLAB, PAGE_SIZE, SLAB_SIZE};
pub use page::{PageLease, PagePool};
