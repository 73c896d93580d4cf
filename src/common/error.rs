use thiserror::Error;

use super::types::PageId;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool exhausted, no evictable frames available")]
    PoolExhausted,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PagePinned(PageId),

    #[error("Disk scheduler error: {0}")]
    Scheduler(String),

    #[error("Corrupt page image on {0}: {1}")]
    CorruptPage(PageId, String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
