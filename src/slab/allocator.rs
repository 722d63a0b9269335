//! Slab allocator implementation

use serde::Serialize;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use tracing::{debug, trace};

/// Size of every page handed out by the allocator (4 KB)
pub const PAGE_SIZE: usize = 4 * 1024;

/// Number of pages carved out of one slab (one bit each in the mask)
pub const PAGES_PER_SLAB: usize = 32;

/// Bytes in one slab allocation
pub const SLAB_SIZE: usize = PAGE_SIZE * PAGES_PER_SLAB;

const ALL_FREE: u32 = u32::MAX;

const SLAB_LAYOUT: Layout = match Layout::from_size_align(SLAB_SIZE, PAGE_SIZE) {
    Ok(layout) => layout,
    Err(_) => panic!("invalid slab layout"),
};

/// One allocation of `PAGES_PER_SLAB` pages plus its availability mask.
///
/// A set bit means the page is free.
struct Slab {
    pages: NonNull<u8>,
    mask: u32,
}

impl Slab {
    /// Allocate a new slab with every page free
    fn allocate() -> Self {
        // SAFETY: SLAB_LAYOUT has a non-zero size.
        let raw = unsafe { alloc::alloc(SLAB_LAYOUT) };
        let pages = match NonNull::new(raw) {
            Some(pages) => pages,
            None => alloc::handle_alloc_error(SLAB_LAYOUT),
        };
        Self {
            pages,
            mask: ALL_FREE,
        }
    }

    fn is_available(&self) -> bool {
        self.mask != 0
    }

    fn is_fully_free(&self) -> bool {
        self.mask == ALL_FREE
    }

    fn live_pages(&self) -> usize {
        PAGES_PER_SLAB - self.mask.count_ones() as usize
    }

    /// Take the lowest free page. The caller checks `is_available` first.
    fn take(&mut self) -> NonNull<u8> {
        debug_assert!(self.is_available());
        let index = self.mask.trailing_zeros() as usize;
        self.mask &= !(1u32 << index);
        // SAFETY: index < PAGES_PER_SLAB, so the offset stays inside the slab.
        unsafe { NonNull::new_unchecked(self.pages.as_ptr().add(index * PAGE_SIZE)) }
    }

    fn page_index(&self, page: NonNull<u8>) -> Option<usize> {
        let base = self.pages.as_ptr() as usize;
        let addr = page.as_ptr() as usize;
        if addr < base || addr >= base + SLAB_SIZE {
            return None;
        }
        let offset = addr - base;
        debug_assert_eq!(offset % PAGE_SIZE, 0, "pointer is not page aligned");
        Some(offset / PAGE_SIZE)
    }

    /// Mark `page` free if it belongs to this slab
    fn try_give_back(&mut self, page: NonNull<u8>) -> bool {
        match self.page_index(page) {
            Some(index) => {
                let bit = 1u32 << index;
                debug_assert_eq!(self.mask & bit, 0, "page released twice");
                self.mask |= bit;
                true
            }
            None => false,
        }
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: `pages` came from `alloc::alloc(SLAB_LAYOUT)` and is freed once.
        unsafe { alloc::dealloc(self.pages.as_ptr(), SLAB_LAYOUT) };
    }
}

/// Page allocator for chunk memory
///
/// Keeps a growable array of slabs; `slabs[0]` is the head-cache position
/// that serves the common allocation and release paths in O(1).
/// Not synchronised: wrap it in a lock (see [`super::PagePool`]) to share it.
pub struct SlabAllocator {
    slabs: Vec<Slab>,
}

// SAFETY: the allocator exclusively owns every slab allocation; raw pointers
// are never shared except as pages handed out to callers.
unsafe impl Send for SlabAllocator {}

impl SlabAllocator {
    /// Create a new allocator with one slab ready
    pub fn new() -> Self {
        let mut slabs = Vec::with_capacity(8);
        slabs.push(Slab::allocate());
        Self { slabs }
    }

    /// Hand out one `PAGE_SIZE` page
    ///
    /// Never returns null; running out of memory aborts through
    /// [`std::alloc::handle_alloc_error`].
    pub fn acquire_page(&mut self) -> NonNull<u8> {
        if self.slabs[0].is_available() {
            return self.slabs[0].take();
        }

        if let Some(index) = self.slabs.iter().position(Slab::is_available) {
            // keep allocating from the same slab without rescanning
            self.slabs.swap(0, index);
            trace!(slab = index, "Moved slab with free pages to head");
            return self.slabs[0].take();
        }

        self.slabs.push(Slab::allocate());
        let last = self.slabs.len() - 1;
        self.slabs.swap(0, last);
        debug!(slabs = self.slabs.len(), "Grew slab allocator");
        self.slabs[0].take()
    }

    /// Return a page obtained from [`acquire_page`](Self::acquire_page)
    ///
    /// Returns `false` when the pointer does not belong to any slab, in
    /// which case the caller still owns it.
    pub fn release_page(&mut self, page: NonNull<u8>) -> bool {
        if self.slabs[0].try_give_back(page) {
            if self.slabs[0].is_fully_free() {
                self.handle_empty_slab(0);
            }
            return true;
        }

        // search from the most recently added slabs
        for index in (1..self.slabs.len()).rev() {
            if self.slabs[index].try_give_back(page) {
                if self.slabs[index].is_fully_free() {
                    self.handle_empty_slab(index);
                }
                return true;
            }
        }
        false
    }

    fn handle_empty_slab(&mut self, index: usize) {
        let count = self.slabs.len();
        if count == 1 {
            return;
        }

        if index != 0 {
            drop(self.slabs.swap_remove(index));
            debug!(slabs = count - 1, "Freed empty slab");
        } else {
            // keep it as a reserve, but stop serving from it first
            self.slabs.swap(0, count - 1);
            trace!("Moved empty head slab to the end");
        }
    }

    /// True if `ptr` points at a page of one of the slabs
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.slabs.iter().any(|slab| slab.page_index(ptr).is_some())
    }

    /// Number of slabs currently allocated
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Number of pages handed out and not yet returned
    pub fn live_pages(&self) -> usize {
        self.slabs.iter().map(Slab::live_pages).sum()
    }

    /// Number of pages available without growing
    pub fn free_pages(&self) -> usize {
        self.slabs.len() * PAGES_PER_SLAB - self.live_pages()
    }

    /// Get statistics about the allocator
    pub fn stats(&self) -> SlabStats {
        let live_pages = self.live_pages();
        SlabStats {
            slabs: self.slabs.len(),
            page_size: PAGE_SIZE,
            live_pages,
            free_pages: self.slabs.len() * PAGES_PER_SLAB - live_pages,
            reserved_bytes: self.slabs.len() * SLAB_SIZE,
        }
    }
}

impl Default for SlabAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for the slab allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlabStats {
    pub slabs: usize,
    pub page_size: usize,
    pub live_pages: usize,
    pub free_pages: usize,
    pub reserved_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocator_basic() {
        let mut allocator = SlabAllocator::new();
        assert_eq!(allocator.slab_count(), 1);

        let page = allocator.acquire_page();
        assert!(allocator.contains(page));
        assert_eq!(allocator.live_pages(), 1);

        // Page memory is writable end to end
        unsafe {
            std::ptr::write_bytes(page.as_ptr(), 0xAB, PAGE_SIZE);
            assert_eq!(*page.as_ptr().add(PAGE_SIZE - 1), 0xAB);
        }

        assert!(allocator.release_page(page));
        assert_eq!(allocator.live_pages(), 0);
    }

    #[test]
    fn test_allocator_reuse() {
        let mut allocator = SlabAllocator::new();

        let first = allocator.acquire_page();
        let _second = allocator.acquire_page();
        assert_ne!(first, _second);

        allocator.release_page(first);

        // Lowest free bit is handed out again
        let third = allocator.acquire_page();
        assert_eq!(third, first);
    }

    #[test]
    fn test_allocator_grows_after_full_slab() {
        let mut allocator = SlabAllocator::new();
        let pages: HashSet<_> = (0..PAGES_PER_SLAB + 1)
            .map(|_| allocator.acquire_page())
            .collect();

        assert_eq!(pages.len(), PAGES_PER_SLAB + 1);
        assert_eq!(allocator.slab_count(), 2);
        assert_eq!(allocator.live_pages(), PAGES_PER_SLAB + 1);
    }

    #[test]
    fn test_foreign_pointer_is_rejected() {
        let mut allocator = SlabAllocator::new();
        let mut outside = [0u8; 16];
        let ptr = NonNull::new(outside.as_mut_ptr()).unwrap();

        assert!(!allocator.contains(ptr));
        assert!(!allocator.release_page(ptr));
    }

    #[test]
    fn test_non_first_slab_is_freed_when_empty() {
        let mut allocator = SlabAllocator::new();
        let mut held: Vec<_> = (0..PAGES_PER_SLAB * 2 + 1)
            .map(|_| allocator.acquire_page())
            .collect();
        assert_eq!(allocator.slab_count(), 3);

        // The second slab no longer sits at the head position
        let second_slab: Vec<_> = held.drain(PAGES_PER_SLAB..PAGES_PER_SLAB * 2).collect();
        for page in second_slab {
            assert!(allocator.release_page(page));
        }
        assert_eq!(allocator.slab_count(), 2);
        assert_eq!(allocator.live_pages(), PAGES_PER_SLAB + 1);
    }

    #[test]
    fn test_last_slab_is_never_freed() {
        let mut allocator = SlabAllocator::new();
        let page = allocator.acquire_page();
        allocator.release_page(page);

        assert_eq!(allocator.slab_count(), 1);
        assert_eq!(allocator.free_pages(), PAGES_PER_SLAB);
    }

    #[test]
    fn test_empty_head_slab_moves_to_end() {
        let mut allocator = SlabAllocator::new();
        let held: Vec<_> = (0..PAGES_PER_SLAB + 1)
            .map(|_| allocator.acquire_page())
            .collect();

        // The newest slab holds one page and sits at the head
        let newest = held[PAGES_PER_SLAB];
        allocator.release_page(newest);
        assert_eq!(allocator.slab_count(), 2);

        // The full slab is at the head now; the scan finds the reserve
        let again = allocator.acquire_page();
        assert_eq!(again, newest);
        assert_eq!(allocator.slab_count(), 2);
    }

    #[test]
    fn test_allocator_stats() {
        let mut allocator = SlabAllocator::new();
        allocator.acquire_page();
        allocator.acquire_page();

        let stats = allocator.stats();
        assert_eq!(stats.slabs, 1);
        assert_eq!(stats.live_pages, 2);
        assert_eq!(stats.free_pages, PAGES_PER_SLAB - 2);
        assert_eq!(stats.reserved_bytes, SLAB_SIZE);
    }
}
