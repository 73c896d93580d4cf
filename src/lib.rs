//! Pagetree - a disk-backed B+Tree index in Rust
//!
//! This crate provides a single-node, persistent key-value index. Entries
//! live in fixed-size pages on disk, a buffer pool caches the hot pages in
//! memory, and a B+Tree organizes them for logarithmic lookups and ordered
//! scans.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Handles disk I/O and page organization
//!   - `DiskManager`: Reads and writes pages, allocates and reuses page ids
//!   - `DiskScheduler`: Background-thread disk I/O scheduling
//!   - `LeafPage`/`InternalPage`: On-disk B+Tree node formats
//!   - `HeaderPage`: Persistent root pointer
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in memory
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: Per-frame metadata and data storage
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII guards for
//!     thread-safe page access
//!
//! - **Index** (`index`): The B+Tree itself
//!   - `BPlusTree`: Insert, remove, point and range lookups with latch
//!     crabbing for concurrent access
//!   - `IndexIterator`: Forward cursor over the sorted entries
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagetree::buffer::BufferPoolManager;
//! use pagetree::index::BPlusTree;
//!
//! // A pool of 64 frames with LRU-2 replacement over "test.db"
//! let bpm = Arc::new(BufferPoolManager::new("test.db", 64, 2).unwrap());
//! let tree = BPlusTree::new(bpm).unwrap();
//!
//! // Duplicate keys with distinct values coexist
//! tree.insert(42, 1).unwrap();
//! tree.insert(42, 2).unwrap();
//! assert_eq!(tree.find(42).unwrap(), vec![1, 2]);
//!
//! // Ordered scan from a key
//! for entry in tree.begin_from(40).unwrap() {
//!     let entry = entry.unwrap();
//!     println!("{} -> {}", entry.key, entry.value);
//! }
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{Entry, FrameId, PageId, Result, StorageError};
