use crate::common::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

use super::{read_u32, write_u32};

const ROOT_PAGE_ID_OFFSET: usize = 0;

/// Read-only view of the tree header page. Its single field is the root
/// page id, or the invalid sentinel when the tree is empty.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        let raw = read_u32(self.data, ROOT_PAGE_ID_OFFSET);
        if raw == INVALID_PAGE_ID.as_u32() {
            None
        } else {
            Some(PageId::new(raw))
        }
    }
}

/// Mutable view of the tree header page.
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        HeaderPageRef::new(self.data).root_page_id()
    }

    pub fn set_root_page_id(&mut self, page_id: Option<PageId>) {
        let raw = page_id.map(|p| p.as_u32()).unwrap_or(INVALID_PAGE_ID.as_u32());
        write_u32(self.data, ROOT_PAGE_ID_OFFSET, raw);
    }
}
