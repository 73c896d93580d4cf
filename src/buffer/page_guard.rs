use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard,
};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolState;
use super::frame_header::FrameHeader;

/// One pin on a resident page. Dropping the pin hands the frame back to
/// the pool, re-arming eviction when the pin count reaches zero. Shared by
/// all three guard flavors so the release path exists exactly once.
pub(crate) struct PagePin {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    pool: Arc<PoolState>,
}

impl PagePin {
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, pool: Arc<PoolState>) -> Self {
        Self {
            page_id,
            frame,
            pool,
        }
    }

    fn page_id(&self) -> PageId {
        self.page_id
    }

    fn frame(&self) -> &Arc<FrameHeader> {
        &self.frame
    }

    fn release(self, dirty: bool) {
        self.pool.release_pin(&self.frame, dirty);
    }
}

/// A pinned page with no latch held. Accessors take the page latch for the
/// duration of the borrow only, so a BasicPageGuard can be held across
/// other page accesses without ordering concerns.
pub struct BasicPageGuard {
    pin: Option<PagePin>,
    dirty: bool,
}

impl BasicPageGuard {
    pub(crate) fn new(pin: PagePin) -> Self {
        Self {
            pin: Some(pin),
            dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pin().page_id()
    }

    /// Borrows the page bytes under a shared latch.
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.pin().frame().data.read(), |page| &page[..])
    }

    /// Borrows the page bytes mutably under an exclusive latch and marks
    /// the page dirty.
    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, [u8]> {
        self.dirty = true;
        RwLockWriteGuard::map(self.pin().frame().data.write(), |page| &mut page[..])
    }

    /// Converts this guard into one holding the shared latch. Blocks until
    /// the latch is available; the pin is never given up in between.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let pin = self.pin.take().unwrap();
        if self.dirty {
            pin.frame().set_dirty(true);
        }
        ReadPageGuard::new(pin)
    }

    /// Converts this guard into one holding the exclusive latch.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let pin = self.pin.take().unwrap();
        let mut guard = WritePageGuard::new(pin);
        guard.dirty = self.dirty;
        guard
    }

    /// Releases the pin now instead of at end of scope.
    pub fn drop_guard(mut self) {
        if let Some(pin) = self.pin.take() {
            pin.release(self.dirty);
        }
    }

    fn pin(&self) -> &PagePin {
        self.pin.as_ref().unwrap()
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        if let Some(pin) = self.pin.take() {
            pin.release(self.dirty);
        }
    }
}

/// A pinned page held under the shared latch for the guard's whole
/// lifetime. Any number of readers may hold one concurrently; a writer
/// blocks until all are gone.
pub struct ReadPageGuard {
    pin: Option<PagePin>,
    // Dropped before the pin; see Drop.
    latch: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    pub(crate) fn new(pin: PagePin) -> Self {
        let latch = pin.frame().data.read();
        // SAFETY: the latch borrows the RwLock inside the FrameHeader that
        // `pin` keeps alive through its Arc. We drop the latch before the
        // pin on every exit path, so the 'static lifetime is never
        // outlived in practice.
        let latch = unsafe {
            std::mem::transmute::<
                RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>>,
                RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>,
            >(latch)
        };
        Self {
            pin: Some(pin),
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.as_ref().unwrap().page_id()
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }

    /// Releases the latch and the pin now instead of at end of scope.
    pub fn drop_guard(mut self) {
        self.release();
    }

    fn release(&mut self) {
        drop(self.latch.take());
        if let Some(pin) = self.pin.take() {
            pin.release(false);
        }
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::ops::Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// A pinned page held under the exclusive latch for the guard's whole
/// lifetime. The page is marked dirty on release only if it was borrowed
/// mutably.
pub struct WritePageGuard {
    pin: Option<PagePin>,
    dirty: bool,
    // Dropped before the pin; see Drop.
    latch: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    pub(crate) fn new(pin: PagePin) -> Self {
        let latch = pin.frame().data.write();
        // SAFETY: same argument as ReadPageGuard::new.
        let latch = unsafe {
            std::mem::transmute::<
                RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>>,
                RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>,
            >(latch)
        };
        Self {
            pin: Some(pin),
            dirty: false,
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pin.as_ref().unwrap().page_id()
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.latch.as_mut().unwrap()[..]
    }

    /// Releases the latch and the pin now instead of at end of scope.
    pub fn drop_guard(mut self) {
        self.release();
    }

    fn release(&mut self) {
        drop(self.latch.take());
        if let Some(pin) = self.pin.take() {
            pin.release(self.dirty);
        }
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::ops::Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl std::ops::DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}
