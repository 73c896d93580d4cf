use super::types::{FrameId, PageId};

/// Size of a page in bytes (8 KB)
pub const PAGE_SIZE: usize = 8192;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Page ID of the tree header page. Reserved; the disk allocator never
/// hands this id out.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default K value for the LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 10;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Size of a leaf entry: composite key (u64 + i64)
pub const LEAF_ENTRY_SIZE: usize = 16;

/// Size of an internal slot: composite key (16) + child page id (4)
pub const INTERNAL_ENTRY_SIZE: usize = 20;

/// Byte size of the leaf page header
pub const LEAF_HEADER_SIZE: usize = 16;

/// Byte size of the internal page header
pub const INTERNAL_HEADER_SIZE: usize = 12;

/// Default max entries in a leaf page. One slot of slack is kept so a page
/// may hold max + 1 entries for the instant before a split.
pub const LEAF_MAX_SIZE: usize = (PAGE_SIZE - LEAF_HEADER_SIZE) / LEAF_ENTRY_SIZE - 1;

/// Default max slots in an internal page (slot 0 included).
pub const INTERNAL_MAX_SIZE: usize = (PAGE_SIZE - INTERNAL_HEADER_SIZE) / INTERNAL_ENTRY_SIZE - 1;
