use std::ptr;

use crate::header::Header;

/// Intrusive singly linked list of every block carved from the arena.
///
/// The list is kept in strictly ascending address order at all times: blocks
/// are only ever appended at the growing end of the heap, and removal only
/// ever excises the tail. That ordering is what lets the release path answer
/// "is this block the last one in the heap" without walking anything but the
/// predecessor chain.
///
/// `head` and `tail` are borrowed views into the arena itself; the list owns
/// no storage of its own.
pub(crate) struct BlockList {
    head: *mut Header,
    tail: *mut Header,
}

impl BlockList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// First-fit search: the first block flagged free whose payload can hold
    /// `size` bytes. No splitting, no best-fit, no side effects.
    ///
    /// **SAFETY**: every header linked into the list must still be live.
    pub unsafe fn find_free(&self, size: usize) -> *mut Header {
        let mut current = self.head;

        unsafe {
            while !current.is_null() {
                if (*current).is_free && (*current).size >= size {
                    return current;
                }
                current = (*current).next;
            }
        }

        ptr::null_mut()
    }

    /// Appends `header` at the growing end of the heap, keeping the list in
    /// ascending address order.
    ///
    /// **SAFETY**: `header` must point to an initialized header whose `next`
    /// is null and whose address is above every block already in the list.
    pub unsafe fn push(&mut self, header: *mut Header) {
        if self.head.is_null() {
            self.head = header;
        } else {
            unsafe { (*self.tail).next = header };
        }
        self.tail = header;
    }

    /// Excises the tail block, the only removal the allocator ever performs.
    /// The predecessor is found by walking from the head; with a single block
    /// the list simply becomes empty.
    ///
    /// **SAFETY**: the list must be non-empty and every linked header live.
    pub unsafe fn pop_tail(&mut self) {
        if self.head == self.tail {
            self.head = ptr::null_mut();
            self.tail = ptr::null_mut();
            return;
        }

        let mut current = self.head;
        unsafe {
            while !current.is_null() {
                if (*current).next == self.tail {
                    (*current).next = ptr::null_mut();
                    self.tail = current;
                    return;
                }
                current = (*current).next;
            }
        }
    }

    #[cfg(test)]
    pub fn tail(&self) -> *mut Header {
        self.tail
    }

    /// Walks the list, calling `visit` on every header.
    ///
    /// **SAFETY**: every linked header must be live for the whole walk.
    #[cfg(test)]
    pub unsafe fn for_each(&self, mut visit: impl FnMut(*mut Header)) {
        let mut current = self.head;
        unsafe {
            while !current.is_null() {
                visit(current);
                current = (*current).next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(size: usize, is_free: bool) -> Header {
        Header {
            size,
            is_free,
            next: ptr::null_mut(),
        }
    }

    fn collect(list: &BlockList) -> Vec<*mut Header> {
        let mut seen = Vec::new();
        unsafe { list.for_each(|h| seen.push(h)) };
        seen
    }

    #[test]
    fn new_list_is_empty() {
        let list = BlockList::new();
        assert!(list.is_empty());
        assert!(list.tail().is_null());
        assert!(unsafe { list.find_free(1) }.is_null());
    }

    #[test]
    fn push_links_in_order_and_tracks_tail() {
        let mut blocks = [header(8, false), header(16, false), header(24, false)];
        let mut list = BlockList::new();

        for block in &mut blocks {
            unsafe { list.push(block) };
        }

        let expected: Vec<*mut Header> = blocks.iter_mut().map(|b| b as *mut Header).collect();
        assert_eq!(expected, collect(&list));
        assert_eq!(expected[2], list.tail());
    }

    #[test]
    fn find_free_is_first_fit() {
        let mut blocks = [
            header(64, false), // big enough but allocated
            header(8, true),   // free but too small
            header(32, true),  // first fit
            header(128, true), // better fit, must not be chosen
        ];
        let mut list = BlockList::new();
        for block in &mut blocks {
            unsafe { list.push(block) };
        }

        let hit = unsafe { list.find_free(16) };
        assert_eq!(&mut blocks[2] as *mut Header, hit);
    }

    #[test]
    fn find_free_reports_miss() {
        let mut blocks = [header(8, false), header(8, true)];
        let mut list = BlockList::new();
        for block in &mut blocks {
            unsafe { list.push(block) };
        }

        assert!(unsafe { list.find_free(9) }.is_null());
    }

    #[test]
    fn pop_tail_of_sole_block_empties_the_list() {
        let mut block = header(8, false);
        let mut list = BlockList::new();
        unsafe {
            list.push(&mut block);
            list.pop_tail();
        }

        assert!(list.is_empty());
        assert!(list.tail().is_null());
    }

    #[test]
    fn pop_tail_relinks_the_predecessor() {
        let mut blocks = [header(8, false), header(16, false), header(24, false)];
        let mut list = BlockList::new();
        for block in &mut blocks {
            unsafe { list.push(block) };
        }

        unsafe { list.pop_tail() };

        let expected: Vec<*mut Header> =
            blocks[..2].iter_mut().map(|b| b as *mut Header).collect();
        assert_eq!(expected, collect(&list));
        assert_eq!(&mut blocks[1] as *mut Header, list.tail());
        assert!(blocks[1].next.is_null());
    }
}
