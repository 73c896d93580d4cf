mod header_page;
mod internal_page;
mod leaf_page;

pub use header_page::*;
pub use internal_page::*;
pub use leaf_page::*;

use crate::common::{Entry, PageId};

/// Discriminator stored in the first word of every tree page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Invalid,
    Internal,
    Leaf,
}

impl PageType {
    pub fn from_u32(raw: u32) -> Self {
        match raw {
            1 => PageType::Internal,
            2 => PageType::Leaf,
            _ => PageType::Invalid,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            PageType::Invalid => 0,
            PageType::Internal => 1,
            PageType::Leaf => 2,
        }
    }
}

/// Reads the page type tag without committing to a typed view.
pub fn page_type_of(data: &[u8]) -> PageType {
    PageType::from_u32(read_u32(data, 0))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    u32::from_le_bytes(bytes)
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_entry(data: &[u8], offset: usize) -> Entry {
    let key: [u8; 8] = data[offset..offset + 8].try_into().unwrap();
    let value: [u8; 8] = data[offset + 8..offset + 16].try_into().unwrap();
    Entry {
        key: u64::from_le_bytes(key),
        value: i64::from_le_bytes(value),
    }
}

pub(crate) fn write_entry(data: &mut [u8], offset: usize, entry: Entry) {
    data[offset..offset + 8].copy_from_slice(&entry.key.to_le_bytes());
    data[offset + 8..offset + 16].copy_from_slice(&entry.value.to_le_bytes());
}

pub(crate) fn read_page_id(data: &[u8], offset: usize) -> PageId {
    PageId::new(read_u32(data, offset))
}

pub(crate) fn write_page_id(data: &mut [u8], offset: usize, page_id: PageId) {
    write_u32(data, offset, page_id.as_u32());
}
