use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StorageError, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::frame_header::FrameHeader;
use super::lru_k_replacer::LruKReplacer;
use super::page_guard::{BasicPageGuard, PagePin, ReadPageGuard, WritePageGuard};

/// Residency bookkeeping: which page lives in which frame, and which
/// frames hold nothing. Held across every capacity operation, including
/// the disk I/O those operations perform, so a page can never be brought
/// in twice or evicted while being brought in.
struct Bookkeeping {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// State shared between the manager and the guards it hands out. Guards
/// only touch the release path.
pub(crate) struct PoolState {
    frames: Vec<Arc<FrameHeader>>,
    book: Mutex<Bookkeeping>,
    replacer: LruKReplacer,
}

impl PoolState {
    /// Drops one pin on a frame, marking the page dirty first if the guard
    /// wrote to it. The last pin to go makes the frame evictable again.
    pub(crate) fn release_pin(&self, frame: &FrameHeader, dirty: bool) {
        // Taking the bookkeeping lock serializes this evictability flip
        // against a concurrent fetch re-pinning the same frame.
        let _book = self.book.lock();
        if dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => self.replacer.set_evictable(frame.frame_id(), true),
            Some(_) => {}
            None => warn!("unpin of frame {} with zero pin count", frame.frame_id()),
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames,
/// evicting with LRU-K when full. All access goes through guards, which
/// keep the page pinned (and optionally latched) for their lifetime.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<PoolState>,
    scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Opens (or creates) the database file at `path` with `pool_size`
    /// frames and an LRU-K horizon of `k`.
    pub fn new(path: impl AsRef<Path>, pool_size: usize, k: usize) -> Result<Self> {
        assert!(pool_size > 0, "pool must have at least one frame");
        let disk_manager = Arc::new(DiskManager::new(path)?);
        Ok(Self::with_disk_manager(disk_manager, pool_size, k))
    }

    pub fn with_disk_manager(disk_manager: Arc<DiskManager>, pool_size: usize, k: usize) -> Self {
        let frames = (0..pool_size)
            .map(|i| Arc::new(FrameHeader::new(FrameId::new(i as u32))))
            .collect();
        let free_list = (0..pool_size).map(|i| FrameId::new(i as u32)).collect();
        Self {
            pool_size,
            state: Arc::new(PoolState {
                frames,
                book: Mutex::new(Bookkeeping {
                    page_table: HashMap::new(),
                    free_list,
                }),
                replacer: LruKReplacer::new(k),
            }),
            scheduler: DiskScheduler::new(disk_manager),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// True when the backing file was created by this open rather than
    /// found on disk.
    pub fn is_new(&self) -> bool {
        self.scheduler.disk_manager().is_new()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.scheduler.disk_manager()
    }

    /// Allocates a fresh zeroed page and returns it pinned.
    pub fn new_page(&self) -> Result<BasicPageGuard> {
        let mut book = self.state.book.lock();
        let frame_id = self.acquire_frame(&mut book)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_id = match self.scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                // Hand the frame back so a failed allocation does not
                // shrink the pool.
                book.free_list.push_back(frame_id);
                return Err(e);
            }
        };
        frame.set_page_id(page_id);
        frame.pin();
        book.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);
        drop(book);

        debug!("allocated page {page_id} in frame {frame_id}");
        Ok(BasicPageGuard::new(self.pin_for(page_id, frame_id)))
    }

    /// Pins the page, reading it from disk if it is not resident.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let frame_id = self.fetch(page_id)?;
        Ok(BasicPageGuard::new(self.pin_for(page_id, frame_id)))
    }

    /// Pins the page and takes its shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch(page_id)?;
        Ok(ReadPageGuard::new(self.pin_for(page_id, frame_id)))
    }

    /// Pins the page and takes its exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch(page_id)?;
        Ok(WritePageGuard::new(self.pin_for(page_id, frame_id)))
    }

    /// Writes the page to disk if resident, clearing its dirty flag.
    /// Returns false for a non-resident page.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let book = self.state.book.lock();
        let Some(&frame_id) = book.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.flush_frame(&self.state.frames[frame_id.as_usize()])?;
        Ok(true)
    }

    /// Flushes every dirty resident page.
    pub fn flush_all(&self) -> Result<()> {
        let book = self.state.book.lock();
        for &frame_id in book.page_table.values() {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                self.flush_frame(frame)?;
            }
        }
        self.scheduler.disk_manager().sync()?;
        Ok(())
    }

    /// Removes the page from the pool and gives its id back to the disk
    /// manager for reuse. Fails if the page is pinned; deleting a
    /// non-resident page only deallocates the id.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut book = self.state.book.lock();
        if let Some(&frame_id) = book.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                return Err(StorageError::PagePinned(page_id));
            }
            book.page_table.remove(&page_id);
            self.state.replacer.remove(frame_id);
            frame.reset();
            book.free_list.push_back(frame_id);
        }
        self.scheduler.disk_manager().deallocate_page(page_id)?;
        debug!("deleted page {page_id}");
        Ok(())
    }

    /// Drops every cached page without flushing and truncates the backing
    /// file. Fails if any page is still pinned.
    pub fn reset(&self) -> Result<()> {
        let mut book = self.state.book.lock();
        for frame in &self.state.frames {
            if frame.pin_count() > 0 {
                return Err(StorageError::PagePinned(frame.page_id()));
            }
        }
        book.page_table.clear();
        book.free_list = (0..self.pool_size).map(|i| FrameId::new(i as u32)).collect();
        for frame in &self.state.frames {
            frame.reset();
        }
        self.state.replacer.clear();
        self.scheduler.disk_manager().reset()?;
        Ok(())
    }

    /// Pin count of a resident page, for tests and diagnostics.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let book = self.state.book.lock();
        book.page_table
            .get(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn free_frame_count(&self) -> usize {
        let book = self.state.book.lock();
        book.free_list.len() + self.state.replacer.evictable_count()
    }

    /// Brings the page into a frame (if needed) and pins it.
    fn fetch(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == crate::common::INVALID_PAGE_ID {
            return Err(StorageError::InvalidPageId(page_id));
        }
        let mut book = self.state.book.lock();

        if let Some(&frame_id) = book.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut book)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut buf = vec![0u8; PAGE_SIZE];
        if let Err(e) = self.scheduler.read_sync(page_id, &mut buf) {
            book.free_list.push_back(frame_id);
            return Err(e);
        }
        frame.copy_from(&buf);
        frame.set_page_id(page_id);
        frame.pin();
        book.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);
        Ok(frame_id)
    }

    /// Finds a frame for a new resident: free list first, then eviction.
    /// The caller holds the bookkeeping lock.
    fn acquire_frame(&self, book: &mut Bookkeeping) -> Result<FrameId> {
        if let Some(frame_id) = book.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Err(StorageError::PoolExhausted);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            if let Err(e) = self.flush_frame(frame) {
                // Eviction already forgot the victim's history; put it
                // back under the replacer so the frame stays reclaimable.
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
        }
        book.page_table.remove(&old_page_id);
        frame.reset();
        debug!("evicted page {old_page_id} from frame {frame_id}");
        Ok(frame_id)
    }

    fn flush_frame(&self, frame: &FrameHeader) -> Result<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        frame.copy_to(&mut buf);
        self.scheduler.write_sync(frame.page_id(), &buf)?;
        frame.set_dirty(false);
        Ok(())
    }

    fn pin_for(&self, page_id: PageId, frame_id: FrameId) -> PagePin {
        PagePin::new(
            page_id,
            Arc::clone(&self.state.frames[frame_id.as_usize()]),
            Arc::clone(&self.state),
        )
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            warn!("failed to flush pool on shutdown: {e}");
        }
    }
}
