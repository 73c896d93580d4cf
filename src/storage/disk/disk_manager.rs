use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// Allocation state shared between `allocate_page` and `deallocate_page`:
/// the next never-used page id and the queue of freed ids awaiting reuse.
struct AllocState {
    /// Next page id that has never been handed out. Page 0 is reserved for
    /// the tree header, so the frontier starts at 1.
    frontier: u32,
    /// Previously deallocated page ids, reused FIFO.
    free_queue: VecDeque<u32>,
}

/// DiskManager is responsible for reading and writing pages to/from disk.
///
/// It manages two files: the data file, where page `p` lives at byte offset
/// `p * PAGE_SIZE`, and a small sidecar meta file holding the allocation
/// frontier and the free-id queue. The meta file is loaded at construction
/// and rewritten on drop, so freed ids survive a restart.
pub struct DiskManager {
    /// The page data file
    data_file: Mutex<File>,
    /// Path to the data file
    data_path: String,
    /// Path to the sidecar meta file
    meta_path: String,
    /// Allocation frontier and free-id queue
    alloc: Mutex<AllocState>,
    /// Whether the store had never allocated a page when opened
    is_new: bool,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the backing store at the given path.
    /// A missing or unopenable file is fatal: construction fails.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_path = path.as_ref().to_string_lossy().to_string();
        let meta_path = format!("{}.meta", data_path);

        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&data_path)?;

        let alloc = match Self::load_meta(&meta_path)? {
            Some(state) => state,
            None => {
                // No meta record: fall back to the data file length so a
                // store written by a crashed process stays readable.
                let pages = (data_file.metadata()?.len() / PAGE_SIZE as u64) as u32;
                AllocState {
                    frontier: pages.max(1),
                    free_queue: VecDeque::new(),
                }
            }
        };
        let is_new = alloc.frontier <= 1 && alloc.free_queue.is_empty();

        Ok(Self {
            data_file: Mutex::new(data_file),
            data_path,
            meta_path,
            alloc: Mutex::new(alloc),
            is_new,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Returns whether the backing store had no allocated pages when opened.
    /// Callers use this to decide whether the header page needs initializing.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Reads a page from disk into the provided buffer.
    /// Reads beyond the end of the file yield zero-filled data; a page that
    /// was allocated but never written reads back as all zeroes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.data_file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut read = 0;
        while read < PAGE_SIZE {
            let n = file.read(&mut data[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read < PAGE_SIZE {
            data[read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.data_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a page id: a previously freed id if one is queued, else the
    /// next unused id. The page's on-disk contents are whatever was there
    /// before (readers of a fresh id see zeroes via the short-read path).
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut alloc = self.alloc.lock();
        let id = match alloc.free_queue.pop_front() {
            Some(id) => id,
            None => {
                let id = alloc.frontier;
                alloc.frontier += 1;
                id
            }
        };
        Ok(PageId::new(id))
    }

    /// Queues a page id for reuse. The page's data is not erased.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.alloc.lock().free_queue.push_back(page_id.as_u32());
        Ok(())
    }

    /// Truncates the backing store and restarts allocation from page 1.
    pub fn reset(&self) -> Result<()> {
        debug!("resetting backing store {}", self.data_path);
        let mut alloc = self.alloc.lock();
        let file = self.data_file.lock();
        file.set_len(0)?;
        alloc.frontier = 1;
        alloc.free_queue.clear();
        drop(file);
        self.write_meta(&alloc)
    }

    /// Rewrites the meta file with the current frontier and free queue.
    pub fn persist_meta(&self) -> Result<()> {
        let alloc = self.alloc.lock();
        self.write_meta(&alloc)
    }

    /// Flushes any buffered writes to stable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.data_file.lock();
        file.sync_all()?;
        Ok(())
    }

    /// Returns the number of page reads performed.
    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the data file.
    pub fn path(&self) -> &str {
        &self.data_path
    }

    /// Meta record layout: [free count u32][frontier u32][free ids u32...],
    /// little endian. Returns None when the meta file does not exist.
    fn load_meta(meta_path: &str) -> Result<Option<AllocState>> {
        let mut file = match File::open(meta_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        if raw.len() < 8 {
            return Ok(None);
        }

        let count = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as usize;
        let frontier = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        if raw.len() < 8 + count * 4 {
            return Ok(None);
        }

        let mut free_queue = VecDeque::with_capacity(count);
        for i in 0..count {
            let off = 8 + i * 4;
            free_queue.push_back(u32::from_le_bytes(raw[off..off + 4].try_into().unwrap()));
        }

        Ok(Some(AllocState {
            frontier: frontier.max(1),
            free_queue,
        }))
    }

    fn write_meta(&self, alloc: &AllocState) -> Result<()> {
        let mut raw = Vec::with_capacity(8 + alloc.free_queue.len() * 4);
        raw.extend_from_slice(&(alloc.free_queue.len() as u32).to_le_bytes());
        raw.extend_from_slice(&alloc.frontier.to_le_bytes());
        for id in &alloc.free_queue {
            raw.extend_from_slice(&id.to_le_bytes());
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.meta_path)?;
        file.write_all(&raw)?;
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        // Persist the allocation state and flush data so a reopened store
        // resumes with the same frontier and free queue.
        let _ = self.persist_meta();
        let file = self.data_file.get_mut();
        let _ = file.sync_all();
    }
}
