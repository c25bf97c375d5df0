//! OS-level heap growth.
//!
//! The allocator owns no memory of its own: every byte it hands out lives in
//! a single contiguous arena that is grown and shrunk only at its high end,
//! through whatever break-style primitive the platform offers. [`HeapSource`]
//! abstracts that primitive so the same allocator runs over the real process
//! break on unix, an emulated break on windows, and a fixed in-memory buffer
//! in tests.

use std::ptr::NonNull;

/// A contiguous region of memory that grows and shrinks only at its high end
/// by an exact signed byte delta, in the manner of `sbrk(2)`.
///
/// **SAFETY (for implementors)**: a successful positive `adjust(delta)` must
/// return the previous high-water mark, pointing at `delta` bytes of memory
/// that are valid for reads and writes, exclusive to this source, and at an
/// address aligned to the allocator's header alignment. The region below the
/// mark must never move.
pub unsafe trait HeapSource {
    /// Moves the high-water mark by `delta` bytes and returns the previous
    /// mark. A zero delta reads the current mark without moving it. `None`
    /// if the underlying primitive declines.
    ///
    /// **SAFETY**: a negative delta invalidates the memory above the new
    /// mark; the caller must guarantee nothing lives there anymore.
    unsafe fn adjust(&mut self, delta: isize) -> Option<NonNull<u8>>;
}

/// The real process break.
///
/// On unix this is `sbrk(2)` directly. The very first call pads the break up
/// to the header alignment once, so that every block span the allocator
/// requests afterwards keeps the break 16-byte aligned.
#[cfg(unix)]
pub struct OsBreak {
    bootstrapped: bool,
}

#[cfg(unix)]
impl OsBreak {
    pub const fn new() -> Self {
        Self {
            bootstrapped: false,
        }
    }
}

#[cfg(unix)]
impl Default for OsBreak {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
mod unix {
    use super::{HeapSource, OsBreak};
    use crate::header::ALIGNMENT;
    use crate::utils::align_up;

    use libc::{c_void, intptr_t, sbrk};

    use std::ptr::NonNull;

    const SBRK_FAILED: *mut c_void = usize::MAX as *mut c_void;

    unsafe impl HeapSource for OsBreak {
        unsafe fn adjust(&mut self, delta: isize) -> Option<NonNull<u8>> {
            unsafe {
                if !self.bootstrapped {
                    let brk = sbrk(0);
                    if brk == SBRK_FAILED {
                        return None;
                    }
                    let pad = align_up(brk as usize, ALIGNMENT) - brk as usize;
                    if pad != 0 && sbrk(pad as intptr_t) == SBRK_FAILED {
                        return None;
                    }
                    self.bootstrapped = true;
                }

                let prev = sbrk(delta as intptr_t);
                if prev == SBRK_FAILED {
                    None
                } else {
                    NonNull::new(prev as *mut u8)
                }
            }
        }
    }
}

/// The emulated process break.
///
/// Windows has no `sbrk`, so the break is emulated over one large region
/// reserved up front: committed pages track the high-water mark, growing and
/// shrinking page by page while the mark itself stays byte-exact.
#[cfg(windows)]
pub struct OsBreak {
    base: *mut u8,
    mark: usize,
    committed: usize,
    page_size: usize,
}

#[cfg(windows)]
impl OsBreak {
    pub const fn new() -> Self {
        Self {
            base: std::ptr::null_mut(),
            mark: 0,
            committed: 0,
            page_size: 0,
        }
    }
}

#[cfg(windows)]
impl Default for OsBreak {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
mod windows_break {
    use super::{HeapSource, OsBreak};
    use crate::utils::align_up;

    use windows::Win32::System::{Memory, SystemInformation};

    use std::mem::MaybeUninit;
    use std::os::raw::c_void;
    use std::ptr::NonNull;

    /// Address space reserved for the emulated break.
    const RESERVE_SIZE: usize = 1 << 30;

    impl OsBreak {
        unsafe fn bootstrap(&mut self) -> Option<()> {
            if !self.base.is_null() {
                return Some(());
            }

            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());
                self.page_size = system_info.assume_init().dwPageSize as usize;

                let base = Memory::VirtualAlloc(
                    None,
                    RESERVE_SIZE,
                    Memory::MEM_RESERVE,
                    Memory::PAGE_READWRITE,
                );
                self.base = NonNull::new(base.cast::<u8>())?.as_ptr();
            }

            Some(())
        }
    }

    unsafe impl HeapSource for OsBreak {
        unsafe fn adjust(&mut self, delta: isize) -> Option<NonNull<u8>> {
            unsafe {
                self.bootstrap()?;

                let prev = self.mark;
                let next = if delta >= 0 {
                    let next = prev.checked_add(delta as usize)?;
                    if next > RESERVE_SIZE {
                        return None;
                    }
                    next
                } else {
                    prev.checked_sub(delta.unsigned_abs())?
                };

                let needed = align_up(next, self.page_size);
                if needed > self.committed {
                    let grown = Memory::VirtualAlloc(
                        Some(self.base.add(self.committed) as *const c_void),
                        needed - self.committed,
                        Memory::MEM_COMMIT,
                        Memory::PAGE_READWRITE,
                    );
                    if grown.is_null() {
                        return None;
                    }
                    self.committed = needed;
                } else if needed < self.committed {
                    let _ = Memory::VirtualFree(
                        self.base.add(needed).cast::<c_void>(),
                        self.committed - needed,
                        Memory::MEM_DECOMMIT,
                    );
                    self.committed = needed;
                }

                self.mark = next;
                NonNull::new(self.base.add(prev))
            }
        }
    }
}

/// Byte buffer aligned like a block header, so offset zero of the fixed heap
/// is a valid header address.
#[repr(C, align(16))]
struct AlignedBytes<const N: usize>([u8; N]);

/// A break that grows over a fixed in-memory buffer instead of asking the
/// OS. Exhausting the buffer makes `adjust` decline, exactly like `sbrk`
/// declining to move the real break.
///
/// Intended for tests and for callers that want the allocator's algorithm
/// over a private heap. Once blocks have been carved the value must not be
/// moved, since carved headers point into the buffer.
pub struct FixedHeap<const N: usize> {
    bytes: AlignedBytes<N>,
    mark: usize,
}

impl<const N: usize> FixedHeap<N> {
    pub const fn new() -> Self {
        Self {
            bytes: AlignedBytes([0; N]),
            mark: 0,
        }
    }

    /// Current high-water mark, as a byte offset into the buffer.
    pub fn mark(&self) -> usize {
        self.mark
    }
}

impl<const N: usize> Default for FixedHeap<N> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const N: usize> HeapSource for FixedHeap<N> {
    unsafe fn adjust(&mut self, delta: isize) -> Option<NonNull<u8>> {
        let prev = self.mark;
        let next = if delta >= 0 {
            let next = prev.checked_add(delta as usize)?;
            if next > N {
                return None;
            }
            next
        } else {
            prev.checked_sub(delta.unsigned_abs())?
        };

        self.mark = next;
        NonNull::new(unsafe { self.bytes.0.as_mut_ptr().add(prev) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ALIGNMENT;

    #[test]
    fn fixed_heap_returns_previous_mark() {
        let mut heap = FixedHeap::<256>::new();

        unsafe {
            let first = heap.adjust(64).unwrap();
            let second = heap.adjust(32).unwrap();
            assert_eq!(first.as_ptr().add(64), second.as_ptr());
        }
        assert_eq!(96, heap.mark());
    }

    #[test]
    fn fixed_heap_zero_delta_reads_the_mark() {
        let mut heap = FixedHeap::<256>::new();

        unsafe {
            let base = heap.adjust(0).unwrap();
            heap.adjust(48).unwrap();
            let brk = heap.adjust(0).unwrap();
            assert_eq!(base.as_ptr().add(48), brk.as_ptr());
        }
        assert_eq!(48, heap.mark());
    }

    #[test]
    fn fixed_heap_declines_past_capacity() {
        let mut heap = FixedHeap::<64>::new();

        unsafe {
            assert!(heap.adjust(65).is_none());
            assert_eq!(0, heap.mark(), "a declined grow must not move the mark");
            assert!(heap.adjust(64).is_some());
            assert!(heap.adjust(1).is_none());
        }
    }

    #[test]
    fn fixed_heap_shrink_returns_capacity() {
        let mut heap = FixedHeap::<64>::new();

        unsafe {
            heap.adjust(64).unwrap();
            heap.adjust(-32).unwrap();
            assert_eq!(32, heap.mark());
            assert!(heap.adjust(32).is_some());
        }
    }

    #[test]
    fn fixed_heap_base_is_header_aligned() {
        let mut heap = FixedHeap::<64>::new();
        let base = unsafe { heap.adjust(0).unwrap() };
        assert_eq!(0, base.as_ptr() as usize % ALIGNMENT);
    }
}
