use crate::common::{Entry, PageId, INTERNAL_ENTRY_SIZE, INTERNAL_HEADER_SIZE, PAGE_SIZE};

use super::{
    read_entry, read_page_id, read_u32, write_entry, write_page_id, write_u32, PageType,
};

// Internal layout:
// | type (4) | size (4) | max_size (4) | slots ... |
// Each slot is a separator entry (16) followed by a child page id (4).
// Slot 0's entry is never compared: searching starts at slot 1, so child 0
// covers everything below slot 1's separator. Non-leftmost children keep
// their slot-0 key equal to the parent's separator for them, which is the
// invariant that makes wholesale borrow/merge of slots correct.
const TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;

fn slot_offset(index: usize) -> usize {
    INTERNAL_HEADER_SIZE + index * INTERNAL_ENTRY_SIZE
}

fn child_offset(index: usize) -> usize {
    slot_offset(index) + 16
}

/// Read-only view of an internal page: separator entries and child page ids.
pub struct InternalPageRef<'a> {
    data: &'a [u8],
}

impl<'a> InternalPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Number of occupied slots, slot 0 included (= number of children).
    pub fn size(&self) -> usize {
        read_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    /// Floored at 2: a non-root internal node always keeps at least two
    /// children, so an underfull child has a sibling on one side or the
    /// other to borrow from or merge with.
    pub fn min_size(&self) -> usize {
        (self.max_size() / 2).max(2)
    }

    pub fn key_at(&self, index: usize) -> Entry {
        debug_assert!(index < self.size());
        read_entry(self.data, slot_offset(index))
    }

    pub fn child_at(&self, index: usize) -> PageId {
        debug_assert!(index < self.size());
        read_page_id(self.data, child_offset(index))
    }

    /// First slot in [1, size) whose key is > the probe; `size()` if none.
    /// The descent child for a key is `upper_bound(key) - 1`.
    pub fn upper_bound(&self, probe: Entry) -> usize {
        let mut left = 1;
        let mut right = self.size();
        while left < right {
            let mid = left + (right - left) / 2;
            if probe < self.key_at(mid) {
                right = mid;
            } else {
                left = mid + 1;
            }
        }
        left
    }
}

/// Mutable view of an internal page.
pub struct InternalPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> InternalPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Must be called on a freshly allocated page before any other use.
    pub fn init(&mut self, max_size: usize) {
        write_u32(self.data, TYPE_OFFSET, PageType::Internal.as_u32());
        write_u32(self.data, SIZE_OFFSET, 0);
        write_u32(self.data, MAX_SIZE_OFFSET, max_size as u32);
    }

    pub fn as_ref(&self) -> InternalPageRef<'_> {
        InternalPageRef::new(self.data)
    }

    pub fn size(&self) -> usize {
        read_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        self.as_ref().min_size()
    }

    pub fn set_size(&mut self, size: usize) {
        write_u32(self.data, SIZE_OFFSET, size as u32);
    }

    pub fn key_at(&self, index: usize) -> Entry {
        read_entry(self.data, slot_offset(index))
    }

    pub fn set_key_at(&mut self, index: usize, key: Entry) {
        write_entry(self.data, slot_offset(index), key);
    }

    pub fn child_at(&self, index: usize) -> PageId {
        read_page_id(self.data, child_offset(index))
    }

    /// Shifts the tail right and writes a (key, child) slot at `index`.
    pub fn insert_at(&mut self, index: usize, key: Entry, child: PageId) {
        let size = self.size();
        debug_assert!(index <= size);
        let src = slot_offset(index);
        let dst = slot_offset(index + 1);
        let len = (size - index) * INTERNAL_ENTRY_SIZE;
        self.data.copy_within(src..src + len, dst);
        write_entry(self.data, src, key);
        write_page_id(self.data, child_offset(index), child);
        self.set_size(size + 1);
    }

    /// Removes the slot at `index`, shifting the tail left.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);
        let dst = slot_offset(index);
        let src = slot_offset(index + 1);
        let len = (size - index - 1) * INTERNAL_ENTRY_SIZE;
        self.data.copy_within(src..src + len, dst);
        self.set_size(size - 1);
    }

    /// Appends at the end; the caller keeps slots ordered.
    pub fn push(&mut self, key: Entry, child: PageId) {
        let size = self.size();
        write_entry(self.data, slot_offset(size), key);
        write_page_id(self.data, child_offset(size), child);
        self.set_size(size + 1);
    }

    /// Inserts a separator in sorted position (slot 0 never compared).
    pub fn insert_sorted(&mut self, key: Entry, child: PageId) {
        let pos = self.as_ref().upper_bound(key);
        self.insert_at(pos, key, child);
    }
}
