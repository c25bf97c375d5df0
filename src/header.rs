use std::mem;

use crate::utils::align_up;

/// Metadata prefixed to every block carved from the arena.
///
/// The header physically precedes the payload bytes handed to the caller:
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        |
/// |       is_free       |        | -> Header
/// +---------------------+        |
/// |        next         |        |
/// +---------------------+ <------+
/// |       Payload       |        |
/// |         ...         |        | -> Returned to the caller
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// `size` is the payload size the caller asked for, excluding the header. It
/// never shrinks while the block is allocated; a block recycled through the
/// free list may therefore be larger than the request it satisfies.
///
/// The 16-byte alignment of the header type is what makes every payload
/// pointer 16-byte aligned, since the heap is only ever grown by whole block
/// spans (see [`block_span`]).
#[repr(C, align(16))]
pub(crate) struct Header {
    /// Payload size in bytes, excluding this header.
    pub size: usize,
    /// Whether the block is eligible for reuse by the free-list search.
    pub is_free: bool,
    /// Next header in the list, in ascending address order.
    pub next: *mut Header,
}

/// Overhead in bytes introduced by [`Header`] in front of every payload.
pub(crate) const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Alignment of [`Header`], and therefore of every payload pointer.
pub(crate) const ALIGNMENT: usize = mem::align_of::<Header>();

/// Total footprint of a block with a `payload_size`-byte payload, padded so
/// the block after it starts on a [`ALIGNMENT`]-aligned address. This is the
/// exact delta by which the heap grows when the block is carved and shrinks
/// when the block is returned to the OS.
///
/// `None` if the footprint does not fit in `usize`.
pub(crate) fn block_span(payload_size: usize) -> Option<usize> {
    let raw = HEADER_SIZE.checked_add(payload_size)?;
    // align_up would overflow past usize::MAX for the last few values of raw.
    raw.checked_add(ALIGNMENT - 1)?;
    Some(align_up(raw, ALIGNMENT))
}

/// Pointer to the payload of `header`.
///
/// **SAFETY**: `header` must point to a live block carved from the arena.
pub(crate) unsafe fn payload_of(header: *mut Header) -> *mut u8 {
    unsafe { (header as *mut u8).add(HEADER_SIZE) }
}

/// Recovers the header from a payload pointer by stepping back one
/// header-width.
///
/// **SAFETY**: `payload` must have been returned by the allocator and still
/// be live. A foreign pointer is not detected and leads straight to
/// undefined behavior, same as the contract of `free` in a libc allocator.
pub(crate) unsafe fn header_of(payload: *mut u8) -> *mut Header {
    unsafe { payload.sub(HEADER_SIZE) as *mut Header }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_a_whole_number_of_alignments() {
        assert_eq!(0, HEADER_SIZE % ALIGNMENT);
        assert_eq!(16, ALIGNMENT);
    }

    #[test]
    fn span_is_padded_to_alignment() {
        for size in 1..=64 {
            let span = block_span(size).unwrap();
            assert_eq!(0, span % ALIGNMENT);
            assert!(span >= HEADER_SIZE + size);
            assert!(span < HEADER_SIZE + size + ALIGNMENT);
        }
    }

    #[test]
    fn span_overflow_is_detected() {
        assert_eq!(None, block_span(usize::MAX));
        assert_eq!(None, block_span(usize::MAX - HEADER_SIZE));
    }

    #[test]
    fn payload_and_header_round_trip() {
        let mut header = Header {
            size: 8,
            is_free: false,
            next: std::ptr::null_mut(),
        };
        let raw = &mut header as *mut Header;

        unsafe {
            let payload = payload_of(raw);
            assert_eq!(raw as usize + HEADER_SIZE, payload as usize);
            assert_eq!(raw, header_of(payload));
        }
    }
}
