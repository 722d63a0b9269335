//! Page leases handed to buffers

use super::allocator::{SlabAllocator, SlabStats, PAGE_SIZE};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::error;

lazy_static! {
    static ref GLOBAL_POOL: Arc<PagePool> = Arc::new(PagePool::new());
}

/// Shared owner of a [`SlabAllocator`]
///
/// Every buffer created without an explicit pool uses [`PagePool::global`].
pub struct PagePool {
    allocator: Mutex<SlabAllocator>,
}

impl PagePool {
    /// Create a pool with its own allocator
    pub fn new() -> Self {
        Self {
            allocator: Mutex::new(SlabAllocator::new()),
        }
    }

    /// The process-wide pool
    pub fn global() -> Arc<PagePool> {
        Arc::clone(&GLOBAL_POOL)
    }

    /// Lease one page; it goes back to the pool when the lease is dropped
    pub fn lease(self: &Arc<Self>) -> PageLease {
        let ptr = self.allocator.lock().acquire_page();
        PageLease {
            pool: Arc::clone(self),
            ptr,
        }
    }

    /// Get statistics about the underlying allocator
    pub fn stats(&self) -> SlabStats {
        self.allocator.lock().stats()
    }

    fn release(&self, ptr: NonNull<u8>) -> bool {
        self.allocator.lock().release_page(ptr)
    }
}

impl Default for PagePool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagePool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive claim on one `PAGE_SIZE` page of a [`PagePool`]
pub struct PageLease {
    pool: Arc<PagePool>,
    ptr: NonNull<u8>,
}

// SAFETY: the lease is the only handle to its page; the pool behind it is
// guarded by a mutex.
unsafe impl Send for PageLease {}
unsafe impl Sync for PageLease {}

impl PageLease {
    /// Start of the page
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the page in bytes
    pub fn len(&self) -> usize {
        PAGE_SIZE
    }

    /// Pages are never empty
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        if !self.pool.release(self.ptr) {
            error!(page = ?self.ptr, "Page lease does not belong to its pool");
            debug_assert!(false, "page lease does not belong to its pool");
        }
    }
}

impl fmt::Display for PageLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page(addr={:p}, size={})", self.ptr, PAGE_SIZE)
    }
}

impl fmt::Debug for PageLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_returns_page_on_drop() {
        let pool = Arc::new(PagePool::new());
        {
            let lease = pool.lease();
            assert_eq!(lease.len(), PAGE_SIZE);
            assert_eq!(pool.stats().live_pages, 1);
        }
        assert_eq!(pool.stats().live_pages, 0);
    }

    #[test]
    fn test_leases_are_distinct() {
        let pool = Arc::new(PagePool::new());
        let a = pool.lease();
        let b = pool.lease();

        assert_ne!(a.as_ptr(), b.as_ptr());
        assert_eq!(pool.stats().live_pages, 2);
    }

    #[test]
    fn test_global_pool_is_shared() {
        let a = PagePool::global();
        let b = PagePool::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_lease_display() {
        let pool = Arc::new(PagePool::new());
        let lease = pool.lease();
        let text = lease.to_string();
        assert!(text.starts_with("Page(addr="));
        assert!(text.ends_with("size=4096)"));
    }
}
