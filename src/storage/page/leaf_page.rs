use crate::common::{
    Entry, PageId, INVALID_PAGE_ID, LEAF_ENTRY_SIZE, LEAF_HEADER_SIZE, PAGE_SIZE,
};

use super::{read_entry, read_u32, write_entry, write_u32, PageType};

// Leaf layout:
// | type (4) | size (4) | max_size (4) | next_page_id (4) | entries ... |
const TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const NEXT_PAGE_OFFSET: usize = 12;

fn entry_offset(index: usize) -> usize {
    LEAF_HEADER_SIZE + index * LEAF_ENTRY_SIZE
}

/// Read-only view of a leaf page: a key-ordered, dense array of composite
/// entries plus a forward sibling pointer.
pub struct LeafPageRef<'a> {
    data: &'a [u8],
}

impl<'a> LeafPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn size(&self) -> usize {
        read_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        let raw = read_u32(self.data, NEXT_PAGE_OFFSET);
        if raw == INVALID_PAGE_ID.as_u32() {
            None
        } else {
            Some(PageId::new(raw))
        }
    }

    pub fn entry_at(&self, index: usize) -> Entry {
        debug_assert!(index < self.size());
        read_entry(self.data, entry_offset(index))
    }

    /// First slot whose entry is >= the probe; `size()` if none.
    pub fn lower_bound(&self, probe: Entry) -> usize {
        let mut left = 0;
        let mut right = self.size();
        while left < right {
            let mid = left + (right - left) / 2;
            if self.entry_at(mid) < probe {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        left
    }

    /// Slot of the exact composite entry, if present.
    pub fn find_exact(&self, entry: Entry) -> Option<usize> {
        let pos = self.lower_bound(entry);
        if pos < self.size() && self.entry_at(pos) == entry {
            Some(pos)
        } else {
            None
        }
    }
}

/// Mutable view of a leaf page.
pub struct LeafPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> LeafPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Must be called on a freshly allocated page before any other use.
    pub fn init(&mut self, max_size: usize) {
        write_u32(self.data, TYPE_OFFSET, PageType::Leaf.as_u32());
        write_u32(self.data, SIZE_OFFSET, 0);
        write_u32(self.data, MAX_SIZE_OFFSET, max_size as u32);
        write_u32(self.data, NEXT_PAGE_OFFSET, INVALID_PAGE_ID.as_u32());
    }

    pub fn as_ref(&self) -> LeafPageRef<'_> {
        LeafPageRef::new(self.data)
    }

    pub fn size(&self) -> usize {
        read_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    pub fn set_size(&mut self, size: usize) {
        write_u32(self.data, SIZE_OFFSET, size as u32);
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        self.as_ref().next_page_id()
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        let raw = page_id.map(|p| p.as_u32()).unwrap_or(INVALID_PAGE_ID.as_u32());
        write_u32(self.data, NEXT_PAGE_OFFSET, raw);
    }

    pub fn entry_at(&self, index: usize) -> Entry {
        read_entry(self.data, entry_offset(index))
    }

    pub fn set_entry_at(&mut self, index: usize, entry: Entry) {
        write_entry(self.data, entry_offset(index), entry);
    }

    /// Shifts the tail right and writes the entry at `index`.
    pub fn insert_at(&mut self, index: usize, entry: Entry) {
        let size = self.size();
        debug_assert!(index <= size);
        let src = entry_offset(index);
        let dst = entry_offset(index + 1);
        let len = (size - index) * LEAF_ENTRY_SIZE;
        self.data.copy_within(src..src + len, dst);
        write_entry(self.data, src, entry);
        self.set_size(size + 1);
    }

    /// Removes the entry at `index`, shifting the tail left.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);
        let dst = entry_offset(index);
        let src = entry_offset(index + 1);
        let len = (size - index - 1) * LEAF_ENTRY_SIZE;
        self.data.copy_within(src..src + len, dst);
        self.set_size(size - 1);
    }

    /// Appends at the end; the caller keeps entries ordered.
    pub fn push(&mut self, entry: Entry) {
        let size = self.size();
        write_entry(self.data, entry_offset(size), entry);
        self.set_size(size + 1);
    }

    /// Inserts in sorted position; rejects an exact duplicate pair.
    pub fn insert_sorted(&mut self, entry: Entry) -> bool {
        let pos = self.as_ref().lower_bound(entry);
        if pos < self.size() && self.entry_at(pos) == entry {
            return false;
        }
        self.insert_at(pos, entry);
        true
    }
}
