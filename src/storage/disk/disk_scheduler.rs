use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, StorageError, PAGE_SIZE};

use super::DiskManager;

/// A queued disk I/O request.
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// The page to read or write
    pub page_id: PageId,
    /// Pointer to a PAGE_SIZE buffer: destination for reads, source for writes
    pub data: *mut u8,
    /// Completion signal; carries whether the I/O succeeded
    pub done: Option<std::sync::mpsc::Sender<bool>>,
}

// Safety: a request is consumed by the single worker thread, and the
// synchronous wrappers keep the buffer alive until completion is signalled.
unsafe impl Send for DiskRequest {}

/// DiskScheduler runs a background worker thread that serializes page I/O
/// against the disk manager. The buffer pool talks to it through the
/// synchronous wrappers, which block until the worker signals completion.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let stop = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || Self::worker_loop(dm, receiver, stop));

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| StorageError::Scheduler(format!("failed to queue request: {}", e)))
    }

    /// Reads one page and waits for the worker to finish.
    pub fn read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        self.schedule(DiskRequest {
            is_write: false,
            page_id,
            data: data.as_mut_ptr(),
            done: Some(tx),
        })?;
        Self::wait(page_id, rx)
    }

    /// Writes one page and waits for the worker to finish.
    pub fn write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        // The worker only reads through the pointer for a write request.
        self.schedule(DiskRequest {
            is_write: true,
            page_id,
            data: data.as_ptr() as *mut u8,
            done: Some(tx),
        })?;
        Self::wait(page_id, rx)
    }

    /// Returns the underlying disk manager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn wait(page_id: PageId, rx: std::sync::mpsc::Receiver<bool>) -> Result<()> {
        let ok = rx
            .recv()
            .map_err(|e| StorageError::Scheduler(format!("worker hung up: {}", e)))?;
        if ok {
            Ok(())
        } else {
            Err(StorageError::Scheduler(format!("I/O failed on {}", page_id)))
        }
    }

    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain outstanding requests before exiting so no caller
                // blocks forever on a completion signal.
                while let Ok(request) = receiver.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        let ok = if request.is_write {
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data).is_ok()
        } else {
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data).is_ok()
        };

        if let Some(done) = request.done {
            let _ = done.send(ok);
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
