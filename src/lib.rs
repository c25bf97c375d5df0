//! A drop-in dynamic memory manager backed by the process break.
//!
//! The arena is a single contiguous region obtained from the OS and grown
//! or shrunk only at its high end, the way classic `sbrk`-based allocators
//! work. Every block is a 16-byte-aligned header followed immediately by
//! its payload, and all blocks ever carved are threaded onto one
//! address-ordered singly linked list:
//!
//! ```text
//!   low addresses                                        high addresses
//!   +--------+---------+--------+---------+--------+---------+
//!   | Header | payload | Header | payload | Header | payload |  <- break
//!   +--------+---------+--------+---------+--------+---------+
//!       |                  ^ |                ^
//!       +------- next -----+ +----- next ----+
//! ```
//!
//! Released blocks are either returned to the OS (only when they sit at
//! the very top of the arena) or flagged free and recycled whole by a
//! first-fit search. There is no splitting and no coalescing.
//!
//! The free functions at the crate root operate on one process-wide arena
//! behind a spin lock:
//!
//! ```no_run
//! let p = breakalloc::allocate(64).unwrap();
//! unsafe { breakalloc::release(p.as_ptr()) };
//! ```
//!
//! For deterministic use (and for tests) the same machinery runs over any
//! [`HeapSource`], such as an in-process fixed-size arena:
//!
//! ```
//! use breakalloc::{Allocator, FixedHeap};
//!
//! let mut alloc: Allocator<FixedHeap<4096>> = Allocator::new(FixedHeap::new());
//! let p = alloc.allocate(24).unwrap();
//! unsafe { alloc.release(p.as_ptr()) };
//! ```

use std::alloc::{GlobalAlloc, Layout};
use std::ptr::{self, NonNull};

use spin::{Mutex, Once};

mod allocator;
mod header;
mod heap;
mod list;
mod utils;

pub use allocator::{AllocError, Allocator};
pub use heap::{FixedHeap, HeapSource, OsBreak};

use header::ALIGNMENT;

static HEAP: Once<Mutex<Allocator<OsBreak>>> = Once::new();

/// The process-wide arena, created on first use. The spin lock is the only
/// synchronization in the crate; taking it never allocates, so [`BreakAlloc`]
/// can lock it from inside `GlobalAlloc` without re-entering itself.
fn heap() -> &'static Mutex<Allocator<OsBreak>> {
    HEAP.call_once(|| Mutex::new(Allocator::new(OsBreak::new())))
}

/// Hands out at least `size` bytes from the process-wide arena, 16-byte
/// aligned. Returns `None` for a zero size or when the OS declines to grow
/// the arena. The block may be a recycled one with more capacity than asked.
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
    heap().lock().allocate(size).ok()
}

/// Returns a block to the process-wide arena. Null is ignored; a block at
/// the top of the arena goes back to the OS, anything else is flagged free
/// for recycling.
///
/// # Safety
///
/// `payload` must be null or a pointer obtained from this crate's global
/// operations and not yet released.
pub unsafe fn release(payload: *mut u8) {
    unsafe { heap().lock().release(payload) }
}

/// Allocates room for `count` elements of `element_size` bytes each and
/// zero-fills the whole payload. Returns `None` when either argument is
/// zero, when the product overflows, or when allocation fails.
///
/// The zeroing happens outside the lock; the block is already owned by the
/// caller at that point, so no other thread can observe it.
pub fn zero_allocate(count: usize, element_size: usize) -> Option<NonNull<u8>> {
    if count == 0 || element_size == 0 {
        return None;
    }
    let size = count.checked_mul(element_size)?;

    let payload = allocate(size)?;
    unsafe { ptr::write_bytes(payload.as_ptr(), 0, size) };
    Some(payload)
}

/// Grows a block from the process-wide arena to at least `new_size` bytes,
/// moving it if needed. A null `payload` or a zero size delegates entirely
/// to [`allocate`]. Blocks never shrink. On failure the original block is
/// untouched and `None` is returned.
///
/// Composed from [`allocate`] and [`release`], each taking the lock on its
/// own: another thread may allocate between the copy and the release, so
/// the operation as a whole is not atomic.
///
/// # Safety
///
/// `payload` must be null or a pointer obtained from this crate's global
/// operations and not yet released, and no other thread may use the block
/// during the call.
pub unsafe fn resize(payload: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
    if payload.is_null() || new_size == 0 {
        return allocate(new_size);
    }

    unsafe {
        let block = header::header_of(payload);
        let old_size = (*block).size;
        if old_size >= new_size {
            return NonNull::new(payload);
        }

        let moved = allocate(new_size)?;
        ptr::copy_nonoverlapping(payload, moved.as_ptr(), old_size);
        release(payload);
        Some(moved)
    }
}

/// Adapter that lets the process-wide arena serve as Rust's global
/// allocator:
///
/// ```no_run
/// use breakalloc::BreakAlloc;
///
/// #[global_allocator]
/// static GLOBAL: BreakAlloc = BreakAlloc;
/// ```
///
/// Requests aligned beyond 16 bytes are refused with null; the arena only
/// ever produces 16-byte-aligned blocks.
pub struct BreakAlloc;

unsafe impl GlobalAlloc for BreakAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        match allocate(layout.size()) {
            Some(payload) => payload.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { release(ptr) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        match zero_allocate(layout.size(), 1) {
            Some(payload) => payload.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        match unsafe { resize(ptr, new_size) } {
            Some(payload) => payload.as_ptr(),
            None => ptr::null_mut(),
        }
    }
}

// Tests against the real process break live in the demo binaries; a cargo
// test process shares the break with its own libc, so the tests here stick
// to paths that never move it.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_requests_yield_null() {
        assert!(allocate(0).is_none());
        assert!(zero_allocate(0, 8).is_none());
        assert!(zero_allocate(8, 0).is_none());
        assert!(unsafe { resize(ptr::null_mut(), 0) }.is_none());
    }

    #[test]
    fn zero_allocate_rejects_overflowing_products() {
        assert!(zero_allocate(usize::MAX, 2).is_none());
        assert!(zero_allocate(usize::MAX / 2 + 1, 2).is_none());
    }

    #[test]
    fn release_of_null_is_harmless() {
        unsafe { release(ptr::null_mut()) };
    }

    #[test]
    fn break_alloc_refuses_oversized_alignment() {
        let layout = Layout::from_size_align(64, 64).unwrap();
        unsafe {
            assert!(BreakAlloc.alloc(layout).is_null());
            assert!(BreakAlloc.alloc_zeroed(layout).is_null());
            assert!(BreakAlloc.realloc(ptr::null_mut(), layout, 128).is_null());
        }
    }
}
