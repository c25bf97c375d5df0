use std::ptr::{self, NonNull};

use thiserror::Error;

use crate::header::{self, Header, block_span};
use crate::heap::HeapSource;
use crate::list::BlockList;

/// Why an operation produced no block. The public API surfaces every variant
/// uniformly as a null result; nothing is logged and nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// A zero size, count, or element size where one is disallowed.
    #[error("allocation size must be non-zero")]
    InvalidSize,
    /// `count * element_size` does not fit in `usize`.
    #[error("element count times element size overflows")]
    Overflow,
    /// The heap source declined to grow the arena.
    #[error("the heap source declined to grow the arena")]
    AllocationFailure,
}

/// The allocator proper: an ordered list of every block carved from one
/// [`HeapSource`]-backed arena, plus the four operations over it.
///
/// The allocator itself carries no lock; exclusivity comes from `&mut self`.
/// The process-wide instance in the crate root wraps one of these in a
/// global mutex, which is what serializes concurrent callers.
pub struct Allocator<S: HeapSource> {
    list: BlockList,
    source: S,
}

// The raw header pointers in the list reach into memory owned by `source`
// and are only dereferenced through `&mut self`.
unsafe impl<S: HeapSource + Send> Send for Allocator<S> {}

impl<S: HeapSource> Allocator<S> {
    pub const fn new(source: S) -> Self {
        Self {
            list: BlockList::new(),
            source,
        }
    }

    /// Hands out a block of at least `size` bytes.
    ///
    /// A first-fit hit recycles an existing free block whole: its header
    /// keeps the size it was carved with, so the caller may receive more
    /// capacity than requested. On a miss the arena grows at its high end by
    /// exactly one block span, and the new block becomes the list tail.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidSize);
        }

        unsafe {
            let reused = self.list.find_free(size);
            if !reused.is_null() {
                (*reused).is_free = false;
                return Ok(NonNull::new_unchecked(header::payload_of(reused)));
            }

            let span = block_span(size).ok_or(AllocError::AllocationFailure)?;
            let delta = isize::try_from(span).map_err(|_| AllocError::AllocationFailure)?;
            let base = self
                .source
                .adjust(delta)
                .ok_or(AllocError::AllocationFailure)?;

            let block = base.as_ptr() as *mut Header;
            block.write(Header {
                size,
                is_free: false,
                next: ptr::null_mut(),
            });
            self.list.push(block);

            Ok(NonNull::new_unchecked(header::payload_of(block)))
        }
    }

    /// Returns a block to the allocator. A null pointer is ignored.
    ///
    /// Only a block sitting at the very top of the arena is given back to
    /// the OS, by shrinking the break and dropping its list entry for good.
    /// Every other block stays in the arena forever, flagged free and
    /// recyclable whole through the free-list search; adjacent free
    /// neighbors are never merged.
    ///
    /// # Safety
    ///
    /// `payload` must be null or a pointer previously returned by this
    /// allocator and not yet released. Foreign pointers are not detected.
    pub unsafe fn release(&mut self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }

        unsafe {
            let block = header::header_of(payload);

            match self.top_block_span(block) {
                Some(span) => {
                    self.list.pop_tail();
                    self.source.adjust(-(span as isize));
                }
                None => (*block).is_free = true,
            }
        }
    }

    /// Span of `block` when it is physically the last region in the arena,
    /// i.e. its padded end sits exactly at the high-water mark.
    unsafe fn top_block_span(&mut self, block: *mut Header) -> Option<usize> {
        unsafe {
            let span = block_span((*block).size)?;
            let end = (block as usize).checked_add(span)?;
            let mark = self.source.adjust(0)?;
            (end == mark.as_ptr() as usize).then_some(span)
        }
    }

    /// Allocates room for `count` elements of `element_size` bytes and
    /// zero-fills the whole payload, including any recycled bytes.
    pub fn zero_allocate(
        &mut self,
        count: usize,
        element_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        if count == 0 || element_size == 0 {
            return Err(AllocError::InvalidSize);
        }
        let size = count.checked_mul(element_size).ok_or(AllocError::Overflow)?;

        let payload = self.allocate(size)?;
        unsafe { ptr::write_bytes(payload.as_ptr(), 0, size) };
        Ok(payload)
    }

    /// Grows a block to at least `new_size` bytes.
    ///
    /// A null pointer or a zero size delegates entirely to [`allocate`],
    /// releasing nothing. A block already big enough is returned unchanged;
    /// its header is never shrunk, so a downsize permanently wastes the
    /// difference. Otherwise the old payload is copied into a fresh block
    /// and the old one released; on allocation failure the old block is
    /// left fully intact.
    ///
    /// [`allocate`]: Self::allocate
    ///
    /// # Safety
    ///
    /// `payload` must be null or a pointer previously returned by this
    /// allocator and not yet released.
    pub unsafe fn resize(
        &mut self,
        payload: *mut u8,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        if payload.is_null() || new_size == 0 {
            return self.allocate(new_size);
        }

        unsafe {
            let block = header::header_of(payload);
            let old_size = (*block).size;
            if old_size >= new_size {
                return Ok(NonNull::new_unchecked(payload));
            }

            let moved = self.allocate(new_size)?;
            ptr::copy_nonoverlapping(payload, moved.as_ptr(), old_size);
            self.release(payload);
            Ok(moved)
        }
    }
}
