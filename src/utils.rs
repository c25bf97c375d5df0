//! Helper functions that don't belong to any concrete module of the allocator.

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Used to pad heap grow/shrink deltas so
/// every block header lands on an address aligned for the header type.
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}
