use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    Entry, PageId, Result, StorageError, HEADER_PAGE_ID, INTERNAL_MAX_SIZE, LEAF_MAX_SIZE,
};
use crate::storage::page::{
    page_type_of, HeaderPageMut, HeaderPageRef, InternalPageMut, InternalPageRef, LeafPageMut,
    LeafPageRef, PageType,
};

use super::iterator::IndexIterator;

/// Latches held along the current root-to-leaf path during a write.
///
/// `write_set` runs from the shallowest retained node down to the current
/// one; `index_set[i]` is the child slot taken inside `write_set[i]` (the
/// leaf at the back has no slot). The header guard, when present, pins the
/// root pointer. Once a node is known not to split or underflow, every
/// guard above it is released.
struct Context {
    header: Option<WritePageGuard>,
    root_page_id: Option<PageId>,
    write_set: VecDeque<WritePageGuard>,
    index_set: VecDeque<usize>,
}

impl Context {
    fn new() -> Self {
        Self {
            header: None,
            root_page_id: None,
            write_set: VecDeque::new(),
            index_set: VecDeque::new(),
        }
    }

    fn release_ancestors(&mut self) {
        self.header = None;
        self.write_set.clear();
        self.index_set.clear();
    }

    fn header_mut(&mut self) -> &mut WritePageGuard {
        self.header
            .as_mut()
            .expect("root changed without the header latch")
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Remove,
}

/// Disk-backed B+Tree over composite entries.
///
/// Writers crab down with exclusive latches, releasing ancestors at the
/// first node that cannot split (insert) or underflow (remove). Readers
/// crab with shared latches and hold at most two at a time, parent and
/// child; leaf-chain walks hold at most one.
pub struct BPlusTree {
    bpm: Arc<BufferPoolManager>,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    /// Opens the tree stored in `bpm`'s database file, initializing the
    /// header page when the file is fresh.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        Self::with_max_sizes(bpm, LEAF_MAX_SIZE, INTERNAL_MAX_SIZE)
    }

    /// Like [`BPlusTree::new`] but with explicit fanout limits. Small
    /// limits force deep trees out of few entries, which is what the
    /// structural tests use.
    pub fn with_max_sizes(
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(
            (2..=LEAF_MAX_SIZE).contains(&leaf_max_size),
            "leaf max size out of range"
        );
        assert!(
            (3..=INTERNAL_MAX_SIZE).contains(&internal_max_size),
            "internal max size out of range"
        );
        let tree = Self {
            bpm,
            leaf_max_size,
            internal_max_size,
        };
        if tree.bpm.is_new() {
            let mut header = tree.bpm.fetch_page_write(HEADER_PAGE_ID)?;
            HeaderPageMut::new(header.data_mut()).set_root_page_id(None);
        }
        Ok(tree)
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root_page_id()?.is_none())
    }

    pub fn root_page_id(&self) -> Result<Option<PageId>> {
        let header = self.bpm.fetch_page_read(HEADER_PAGE_ID)?;
        Ok(HeaderPageRef::new(header.data()).root_page_id())
    }

    /// Inserts the (key, value) pair. Returns false if that exact pair is
    /// already present; equal keys with distinct values all coexist.
    pub fn insert(&self, key: u64, value: i64) -> Result<bool> {
        let entry = Entry::new(key, value);
        let mut ctx = Context::new();
        let header = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let root = HeaderPageRef::new(header.data()).root_page_id();
        ctx.root_page_id = root;
        ctx.header = Some(header);

        let Some(root) = root else {
            return self.start_new_tree(&mut ctx, entry);
        };
        self.descend_for_write(&mut ctx, root, entry, WriteMode::Insert)?;

        let (inserted, overflow) = {
            let leaf_guard = ctx.write_set.back_mut().expect("leaf latched");
            let mut leaf = LeafPageMut::new(leaf_guard.data_mut());
            if leaf.insert_sorted(entry) {
                (true, leaf.size() > leaf.max_size())
            } else {
                (false, false)
            }
        };
        if !inserted {
            return Ok(false);
        }
        if overflow {
            self.split_leaf(&mut ctx)?;
        }
        Ok(true)
    }

    /// Removes the exact (key, value) pair. Returns false if absent.
    pub fn remove(&self, key: u64, value: i64) -> Result<bool> {
        let entry = Entry::new(key, value);
        let mut ctx = Context::new();
        let header = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let root = HeaderPageRef::new(header.data()).root_page_id();
        ctx.root_page_id = root;
        ctx.header = Some(header);

        let Some(root) = root else {
            return Ok(false);
        };
        self.descend_for_write(&mut ctx, root, entry, WriteMode::Remove)?;

        let removed = {
            let leaf_guard = ctx.write_set.back_mut().expect("leaf latched");
            let mut leaf = LeafPageMut::new(leaf_guard.data_mut());
            match leaf.as_ref().find_exact(entry) {
                Some(pos) => {
                    leaf.remove_at(pos);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return Ok(false);
        }
        self.rebalance(&mut ctx)?;
        Ok(true)
    }

    /// All values stored under `key`, in ascending order.
    pub fn find(&self, key: u64) -> Result<Vec<i64>> {
        let probe = Entry::min_for(key);
        let mut result = Vec::new();
        let Some(mut guard) = self.find_leaf(probe)? else {
            return Ok(result);
        };
        let mut pos = LeafPageRef::new(guard.data()).lower_bound(probe);
        loop {
            let mut past_key = false;
            let next = {
                let view = LeafPageRef::new(guard.data());
                while pos < view.size() {
                    let entry = view.entry_at(pos);
                    if entry.key != key {
                        past_key = true;
                        break;
                    }
                    result.push(entry.value);
                    pos += 1;
                }
                view.next_page_id()
            };
            if past_key {
                return Ok(result);
            }
            match next {
                Some(next_pid) => {
                    // Release before taking the sibling's latch.
                    drop(guard);
                    guard = self.bpm.fetch_page_read(next_pid)?;
                    pos = 0;
                }
                None => return Ok(result),
            }
        }
    }

    /// Cursor at the first entry of the tree.
    pub fn begin(&self) -> Result<IndexIterator> {
        self.begin_at(Entry::min_for(0))
    }

    /// Cursor at the first entry whose key is >= `key`.
    pub fn begin_from(&self, key: u64) -> Result<IndexIterator> {
        self.begin_at(Entry::min_for(key))
    }

    /// The past-the-end cursor.
    pub fn end(&self) -> IndexIterator {
        IndexIterator::end(Arc::clone(&self.bpm))
    }

    /// Drops every entry and truncates the backing file. Fails if any page
    /// is still pinned elsewhere.
    pub fn clear(&self) -> Result<()> {
        self.bpm.reset()?;
        let mut header = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        HeaderPageMut::new(header.data_mut()).set_root_page_id(None);
        Ok(())
    }

    /// Forces all cached modifications to disk.
    pub fn flush(&self) -> Result<()> {
        self.bpm.flush_all()
    }

    fn begin_at(&self, probe: Entry) -> Result<IndexIterator> {
        let Some(guard) = self.find_leaf(probe)? else {
            return Ok(IndexIterator::end(Arc::clone(&self.bpm)));
        };
        let pos = LeafPageRef::new(guard.data()).lower_bound(probe);
        IndexIterator::new(Arc::clone(&self.bpm), guard, pos)
    }

    /// Shared-latch descent to the leaf covering `probe`. Holds parent and
    /// child at once, never more; None when the tree is empty.
    fn find_leaf(&self, probe: Entry) -> Result<Option<ReadPageGuard>> {
        let header = self.bpm.fetch_page_read(HEADER_PAGE_ID)?;
        let Some(root) = HeaderPageRef::new(header.data()).root_page_id() else {
            return Ok(None);
        };
        let mut guard = self.bpm.fetch_page_read(root)?;
        drop(header);
        loop {
            match page_type_of(guard.data()) {
                PageType::Leaf => return Ok(Some(guard)),
                PageType::Internal => {
                    let child = {
                        let view = InternalPageRef::new(guard.data());
                        view.child_at(view.upper_bound(probe) - 1)
                    };
                    // Latch the child before releasing the parent.
                    let next = self.bpm.fetch_page_read(child)?;
                    guard = next;
                }
                PageType::Invalid => {
                    return Err(StorageError::CorruptPage(
                        guard.page_id(),
                        "unknown page type".into(),
                    ))
                }
            }
        }
    }

    /// Exclusive-latch descent for `probe`, filling the context. A node is
    /// safe when the pending operation cannot change its parent: under max
    /// for inserts, over min for removes (the root has its own floor).
    fn descend_for_write(
        &self,
        ctx: &mut Context,
        root: PageId,
        probe: Entry,
        mode: WriteMode,
    ) -> Result<()> {
        let mut page_id = root;
        loop {
            let guard = self.bpm.fetch_page_write(page_id)?;
            let is_root = ctx.root_page_id == Some(page_id);
            match page_type_of(guard.data()) {
                PageType::Leaf => {
                    let safe = {
                        let view = LeafPageRef::new(guard.data());
                        match mode {
                            WriteMode::Insert => view.size() < view.max_size(),
                            WriteMode::Remove if is_root => view.size() > 1,
                            WriteMode::Remove => view.size() > view.min_size(),
                        }
                    };
                    if safe {
                        ctx.release_ancestors();
                    }
                    ctx.write_set.push_back(guard);
                    return Ok(());
                }
                PageType::Internal => {
                    let (safe, idx, child) = {
                        let view = InternalPageRef::new(guard.data());
                        let safe = match mode {
                            WriteMode::Insert => view.size() < view.max_size(),
                            WriteMode::Remove if is_root => view.size() > 2,
                            WriteMode::Remove => view.size() > view.min_size(),
                        };
                        let idx = view.upper_bound(probe) - 1;
                        (safe, idx, view.child_at(idx))
                    };
                    if safe {
                        ctx.release_ancestors();
                    }
                    ctx.write_set.push_back(guard);
                    ctx.index_set.push_back(idx);
                    page_id = child;
                }
                PageType::Invalid => {
                    return Err(StorageError::CorruptPage(
                        page_id,
                        "unknown page type".into(),
                    ))
                }
            }
        }
    }

    fn start_new_tree(&self, ctx: &mut Context, entry: Entry) -> Result<bool> {
        let mut root = self.bpm.new_page()?.upgrade_write();
        let root_pid = root.page_id();
        {
            let mut leaf = LeafPageMut::new(root.data_mut());
            leaf.init(self.leaf_max_size);
            leaf.push(entry);
        }
        let header = ctx.header_mut();
        HeaderPageMut::new(header.data_mut()).set_root_page_id(Some(root_pid));
        ctx.root_page_id = Some(root_pid);
        debug!("created root leaf {root_pid}");
        Ok(true)
    }

    /// Splits the overflowing leaf at the back of the context, moving the
    /// upper half into a fresh right sibling, and pushes the separator up.
    fn split_leaf(&self, ctx: &mut Context) -> Result<()> {
        let mut left = ctx.write_set.pop_back().expect("leaf latched");
        let left_pid = left.page_id();
        let mut right = self.bpm.new_page()?.upgrade_write();
        let right_pid = right.page_id();

        let separator = {
            let mut left_page = LeafPageMut::new(left.data_mut());
            let mut right_page = LeafPageMut::new(right.data_mut());
            right_page.init(self.leaf_max_size);
            let size = left_page.size();
            let mid = size / 2;
            for i in mid..size {
                right_page.push(left_page.entry_at(i));
            }
            left_page.set_size(mid);
            right_page.set_next_page_id(left_page.next_page_id());
            left_page.set_next_page_id(Some(right_pid));
            right_page.entry_at(0)
        };
        debug!("split leaf {left_pid}, new sibling {right_pid}");

        // The split pages sit below an exclusively latched ancestor (or the
        // header), so their latches can go before the separator lands.
        drop(left);
        drop(right);
        self.insert_into_parent(ctx, separator, left_pid, right_pid)
    }

    /// Inserts a separator into the parent of a just-split node, splitting
    /// upward as long as parents overflow.
    fn insert_into_parent(
        &self,
        ctx: &mut Context,
        mut separator: Entry,
        mut left_pid: PageId,
        mut right_pid: PageId,
    ) -> Result<()> {
        loop {
            if ctx.write_set.is_empty() {
                // The split node was the root: grow a level.
                let mut root = self.bpm.new_page()?.upgrade_write();
                let root_pid = root.page_id();
                {
                    let mut page = InternalPageMut::new(root.data_mut());
                    page.init(self.internal_max_size);
                    // Slot 0's key is never compared.
                    page.push(Entry::new(0, 0), left_pid);
                    page.push(separator, right_pid);
                }
                let header = ctx.header_mut();
                HeaderPageMut::new(header.data_mut()).set_root_page_id(Some(root_pid));
                ctx.root_page_id = Some(root_pid);
                debug!("grew new root {root_pid}");
                return Ok(());
            }

            let overflow = {
                let parent = ctx.write_set.back_mut().expect("parent latched");
                let mut page = InternalPageMut::new(parent.data_mut());
                page.insert_sorted(separator, right_pid);
                page.size() > page.max_size()
            };
            if !overflow {
                return Ok(());
            }

            let mut left = ctx.write_set.pop_back().expect("parent latched");
            ctx.index_set.pop_back();
            left_pid = left.page_id();
            let mut right = self.bpm.new_page()?.upgrade_write();
            right_pid = right.page_id();
            {
                let mut left_page = InternalPageMut::new(left.data_mut());
                let mut right_page = InternalPageMut::new(right.data_mut());
                right_page.init(self.internal_max_size);
                let size = left_page.size();
                let mid = size / 2;
                for i in mid..size {
                    right_page.push(left_page.key_at(i), left_page.child_at(i));
                }
                left_page.set_size(mid);
                // Slot 0 of the right page keeps the separator key, so the
                // parent's copy and the child's copy stay equal.
                separator = right_page.key_at(0);
            }
            debug!("split internal {left_pid}, new sibling {right_pid}");
            drop(left);
            drop(right);
        }
    }

    /// Walks from the modified leaf back up, fixing every underfull node by
    /// borrowing from a sibling or merging into one.
    fn rebalance(&self, ctx: &mut Context) -> Result<()> {
        loop {
            let cur = ctx.write_set.pop_back().expect("node latched");
            let cur_pid = cur.page_id();
            let is_root = ctx.root_page_id == Some(cur_pid);

            match page_type_of(cur.data()) {
                PageType::Leaf => {
                    let (size, min) = {
                        let view = LeafPageRef::new(cur.data());
                        (view.size(), view.min_size())
                    };
                    if is_root {
                        if size == 0 {
                            self.clear_root(ctx, cur)?;
                        }
                        return Ok(());
                    }
                    if size >= min {
                        return Ok(());
                    }
                    if self.repair_leaf(ctx, cur)? {
                        return Ok(());
                    }
                    // Merged away a slot; the parent may now be underfull.
                }
                PageType::Internal => {
                    let (size, min) = {
                        let view = InternalPageRef::new(cur.data());
                        (view.size(), view.min_size())
                    };
                    if is_root {
                        if size == 1 {
                            self.demote_root(ctx, cur)?;
                        }
                        return Ok(());
                    }
                    if size >= min {
                        return Ok(());
                    }
                    if self.repair_internal(ctx, cur)? {
                        return Ok(());
                    }
                }
                PageType::Invalid => {
                    return Err(StorageError::CorruptPage(
                        cur_pid,
                        "unknown page type".into(),
                    ))
                }
            }
        }
    }

    /// Fixes an underfull leaf. Returns true if a borrow resolved it, false
    /// if a merge removed a slot from the parent.
    fn repair_leaf(&self, ctx: &mut Context, mut cur: WritePageGuard) -> Result<bool> {
        let cur_pid = cur.page_id();
        let idx = ctx.index_set.pop_back().expect("parent slot recorded");
        let parent = ctx.write_set.back_mut().expect("parent latched");
        let parent_size = InternalPageRef::new(parent.data()).size();

        if idx + 1 < parent_size {
            let right_pid = InternalPageRef::new(parent.data()).child_at(idx + 1);
            let mut right = self.bpm.fetch_page_write(right_pid)?;
            let borrowed = {
                let mut right_page = LeafPageMut::new(right.data_mut());
                if right_page.size() > right_page.min_size() {
                    let moved = right_page.entry_at(0);
                    right_page.remove_at(0);
                    let new_separator = right_page.entry_at(0);
                    LeafPageMut::new(cur.data_mut()).push(moved);
                    InternalPageMut::new(parent.data_mut()).set_key_at(idx + 1, new_separator);
                    true
                } else {
                    false
                }
            };
            if borrowed {
                debug!("leaf {cur_pid} borrowed from right sibling {right_pid}");
                return Ok(true);
            }
        }

        if idx > 0 {
            let left_pid = InternalPageRef::new(parent.data()).child_at(idx - 1);
            let mut left = self.bpm.fetch_page_write(left_pid)?;
            let borrowed = {
                let mut left_page = LeafPageMut::new(left.data_mut());
                if left_page.size() > left_page.min_size() {
                    let moved = left_page.entry_at(left_page.size() - 1);
                    let new_size = left_page.size() - 1;
                    left_page.set_size(new_size);
                    LeafPageMut::new(cur.data_mut()).insert_at(0, moved);
                    InternalPageMut::new(parent.data_mut()).set_key_at(idx, moved);
                    true
                } else {
                    false
                }
            };
            if borrowed {
                debug!("leaf {cur_pid} borrowed from left sibling {left_pid}");
                return Ok(true);
            }
        }

        if idx + 1 < parent_size {
            // Fold the right sibling into this page.
            let right_pid = InternalPageRef::new(parent.data()).child_at(idx + 1);
            let right = self.bpm.fetch_page_write(right_pid)?;
            {
                let mut cur_page = LeafPageMut::new(cur.data_mut());
                let right_page = LeafPageRef::new(right.data());
                for i in 0..right_page.size() {
                    cur_page.push(right_page.entry_at(i));
                }
                cur_page.set_next_page_id(right_page.next_page_id());
            }
            InternalPageMut::new(parent.data_mut()).remove_at(idx + 1);
            drop(right);
            drop(cur);
            self.bpm.delete_page(right_pid)?;
            debug!("merged leaf {right_pid} into {cur_pid}");
        } else {
            // Fold this page into the left sibling.
            let left_pid = InternalPageRef::new(parent.data()).child_at(idx - 1);
            let mut left = self.bpm.fetch_page_write(left_pid)?;
            {
                let mut left_page = LeafPageMut::new(left.data_mut());
                let cur_page = LeafPageRef::new(cur.data());
                for i in 0..cur_page.size() {
                    left_page.push(cur_page.entry_at(i));
                }
                left_page.set_next_page_id(cur_page.next_page_id());
            }
            InternalPageMut::new(parent.data_mut()).remove_at(idx);
            drop(left);
            drop(cur);
            self.bpm.delete_page(cur_pid)?;
            debug!("merged leaf {cur_pid} into left sibling {left_pid}");
        }
        Ok(false)
    }

    /// Fixes an underfull internal node. Slot 0 keys of non-leftmost
    /// children equal their parent separator, so whole slots move between
    /// siblings without key surgery.
    fn repair_internal(&self, ctx: &mut Context, mut cur: WritePageGuard) -> Result<bool> {
        let cur_pid = cur.page_id();
        let idx = ctx.index_set.pop_back().expect("parent slot recorded");
        let parent = ctx.write_set.back_mut().expect("parent latched");
        let parent_size = InternalPageRef::new(parent.data()).size();

        if idx + 1 < parent_size {
            let right_pid = InternalPageRef::new(parent.data()).child_at(idx + 1);
            let mut right = self.bpm.fetch_page_write(right_pid)?;
            let borrowed = {
                let mut right_page = InternalPageMut::new(right.data_mut());
                if right_page.size() > right_page.min_size() {
                    let moved_key = right_page.key_at(0);
                    let moved_child = right_page.child_at(0);
                    right_page.remove_at(0);
                    let new_separator = right_page.key_at(0);
                    InternalPageMut::new(cur.data_mut()).push(moved_key, moved_child);
                    InternalPageMut::new(parent.data_mut()).set_key_at(idx + 1, new_separator);
                    true
                } else {
                    false
                }
            };
            if borrowed {
                debug!("internal {cur_pid} borrowed from right sibling {right_pid}");
                return Ok(true);
            }
        }

        if idx > 0 {
            let left_pid = InternalPageRef::new(parent.data()).child_at(idx - 1);
            let mut left = self.bpm.fetch_page_write(left_pid)?;
            let borrowed = {
                let mut left_page = InternalPageMut::new(left.data_mut());
                if left_page.size() > left_page.min_size() {
                    let last = left_page.size() - 1;
                    let moved_key = left_page.key_at(last);
                    let moved_child = left_page.child_at(last);
                    left_page.set_size(last);
                    InternalPageMut::new(cur.data_mut()).insert_at(0, moved_key, moved_child);
                    InternalPageMut::new(parent.data_mut()).set_key_at(idx, moved_key);
                    true
                } else {
                    false
                }
            };
            if borrowed {
                debug!("internal {cur_pid} borrowed from left sibling {left_pid}");
                return Ok(true);
            }
        }

        if idx + 1 < parent_size {
            let right_pid = InternalPageRef::new(parent.data()).child_at(idx + 1);
            let right = self.bpm.fetch_page_write(right_pid)?;
            {
                let mut cur_page = InternalPageMut::new(cur.data_mut());
                let right_page = InternalPageRef::new(right.data());
                for i in 0..right_page.size() {
                    cur_page.push(right_page.key_at(i), right_page.child_at(i));
                }
            }
            InternalPageMut::new(parent.data_mut()).remove_at(idx + 1);
            drop(right);
            drop(cur);
            self.bpm.delete_page(right_pid)?;
            debug!("merged internal {right_pid} into {cur_pid}");
        } else {
            let left_pid = InternalPageRef::new(parent.data()).child_at(idx - 1);
            let mut left = self.bpm.fetch_page_write(left_pid)?;
            {
                let mut left_page = InternalPageMut::new(left.data_mut());
                let cur_page = InternalPageRef::new(cur.data());
                for i in 0..cur_page.size() {
                    left_page.push(cur_page.key_at(i), cur_page.child_at(i));
                }
            }
            InternalPageMut::new(parent.data_mut()).remove_at(idx);
            drop(left);
            drop(cur);
            self.bpm.delete_page(cur_pid)?;
            debug!("merged internal {cur_pid} into left sibling {left_pid}");
        }
        Ok(false)
    }

    /// The root leaf ran empty: the tree is now empty.
    fn clear_root(&self, ctx: &mut Context, cur: WritePageGuard) -> Result<()> {
        let pid = cur.page_id();
        let header = ctx.header_mut();
        HeaderPageMut::new(header.data_mut()).set_root_page_id(None);
        ctx.root_page_id = None;
        drop(cur);
        self.bpm.delete_page(pid)?;
        debug!("tree emptied, dropped root {pid}");
        Ok(())
    }

    /// The root internal node is down to one child: shrink a level.
    fn demote_root(&self, ctx: &mut Context, cur: WritePageGuard) -> Result<()> {
        let pid = cur.page_id();
        let child = InternalPageRef::new(cur.data()).child_at(0);
        let header = ctx.header_mut();
        HeaderPageMut::new(header.data_mut()).set_root_page_id(Some(child));
        ctx.root_page_id = Some(child);
        drop(cur);
        self.bpm.delete_page(pid)?;
        debug!("demoted root {pid} to {child}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(dir: &TempDir, leaf_max: usize, internal_max: usize) -> BPlusTree {
        let path = dir.path().join("tree.db");
        let bpm = Arc::new(BufferPoolManager::new(path, 16, 2).unwrap());
        BPlusTree::with_max_sizes(bpm, leaf_max, internal_max).unwrap()
    }

    #[test]
    fn test_empty_tree() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 4, 4);
        assert!(t.is_empty().unwrap());
        assert_eq!(t.find(1).unwrap(), Vec::<i64>::new());
        assert!(!t.remove(1, 1).unwrap());
        assert!(t.begin().unwrap().is_end());
    }

    #[test]
    fn test_insert_and_find_single_leaf() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 4, 4);

        assert!(t.insert(2, 20).unwrap());
        assert!(t.insert(1, 10).unwrap());
        assert!(t.insert(3, 30).unwrap());
        assert!(!t.insert(2, 20).unwrap());

        assert_eq!(t.find(1).unwrap(), vec![10]);
        assert_eq!(t.find(2).unwrap(), vec![20]);
        assert_eq!(t.find(4).unwrap(), Vec::<i64>::new());
        assert!(!t.is_empty().unwrap());
    }

    #[test]
    fn test_leaf_split_keeps_lower_half_left() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 4, 4);

        for k in 1..=5u64 {
            assert!(t.insert(k, k as i64).unwrap());
        }

        // Five entries overflow a max-4 leaf; the split leaves {1,2} on the
        // left and {3,4,5} on the right under a fresh root.
        let root = t.root_page_id().unwrap().unwrap();
        let bpm = t.buffer_pool();
        let guard = bpm.fetch_page_read(root).unwrap();
        assert_eq!(page_type_of(guard.data()), PageType::Internal);
        let (left_pid, right_pid, separator) = {
            let view = InternalPageRef::new(guard.data());
            assert_eq!(view.size(), 2);
            (view.child_at(0), view.child_at(1), view.key_at(1))
        };
        drop(guard);
        assert_eq!(separator, Entry::new(3, 3));

        let left = bpm.fetch_page_read(left_pid).unwrap();
        assert_eq!(LeafPageRef::new(left.data()).size(), 2);
        drop(left);
        let right = bpm.fetch_page_read(right_pid).unwrap();
        assert_eq!(LeafPageRef::new(right.data()).size(), 3);
        assert_eq!(LeafPageRef::new(right.data()).entry_at(0), Entry::new(3, 3));
    }

    #[test]
    fn test_duplicate_keys_collect_all_values() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 4, 4);

        assert!(t.insert(7, 3).unwrap());
        assert!(t.insert(7, 1).unwrap());
        assert!(t.insert(7, 2).unwrap());
        assert!(t.insert(5, 50).unwrap());
        assert!(t.insert(9, 90).unwrap());

        assert_eq!(t.find(7).unwrap(), vec![1, 2, 3]);

        assert!(t.remove(7, 2).unwrap());
        assert!(!t.remove(7, 2).unwrap());
        assert_eq!(t.find(7).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_duplicates_across_leaf_boundary() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 2, 3);

        for v in 0..6i64 {
            assert!(t.insert(42, v).unwrap());
        }
        assert_eq!(t.find(42).unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_many_inserts_deep_tree() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 3, 3);

        for k in 0..200u64 {
            assert!(t.insert(k, k as i64).unwrap());
        }
        for k in 0..200u64 {
            assert_eq!(t.find(k).unwrap(), vec![k as i64], "key {k}");
        }

        let entries: Vec<Entry> = t.begin().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 200);
        assert!(entries.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_reverse_order_inserts() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 3, 3);

        for k in (0..100u64).rev() {
            assert!(t.insert(k, -(k as i64)).unwrap());
        }
        for k in 0..100u64 {
            assert_eq!(t.find(k).unwrap(), vec![-(k as i64)]);
        }
    }

    #[test]
    fn test_remove_to_empty() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 3, 3);

        for k in 0..50u64 {
            assert!(t.insert(k, k as i64).unwrap());
        }
        for k in 0..50u64 {
            assert!(t.remove(k, k as i64).unwrap(), "key {k}");
        }
        assert!(t.is_empty().unwrap());
        assert!(t.begin().unwrap().is_end());

        // The tree is usable again after draining.
        assert!(t.insert(1, 1).unwrap());
        assert_eq!(t.find(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_remove_reverse_order() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 3, 3);

        for k in 0..80u64 {
            assert!(t.insert(k, 0).unwrap());
        }
        for k in (0..80u64).rev() {
            assert!(t.remove(k, 0).unwrap(), "key {k}");
            // Everything below k must still be reachable.
            if k > 0 {
                assert_eq!(t.find(k - 1).unwrap(), vec![0]);
            }
        }
        assert!(t.is_empty().unwrap());
    }

    #[test]
    fn test_interleaved_insert_remove() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 3, 3);

        for k in 0..60u64 {
            assert!(t.insert(k, 1).unwrap());
        }
        // Drop the even keys, keep the odd.
        for k in (0..60u64).step_by(2) {
            assert!(t.remove(k, 1).unwrap());
        }
        for k in 0..60u64 {
            let expect: Vec<i64> = if k % 2 == 1 { vec![1] } else { vec![] };
            assert_eq!(t.find(k).unwrap(), expect, "key {k}");
        }

        let count = t.begin().unwrap().count();
        assert_eq!(count, 30);
    }

    #[test]
    fn test_begin_from() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 3, 3);

        for k in (0..40u64).step_by(2) {
            assert!(t.insert(k, k as i64).unwrap());
        }

        // Exact hit.
        let mut it = t.begin_from(10).unwrap();
        assert_eq!(it.entry(), Some(Entry::new(10, 10)));

        // A missing key positions at the next larger one.
        it = t.begin_from(11).unwrap();
        assert_eq!(it.entry(), Some(Entry::new(12, 12)));

        // Past the end.
        it = t.begin_from(100).unwrap();
        assert!(it.is_end());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let t = tree(&dir, 3, 3);

        for k in 0..30u64 {
            assert!(t.insert(k, 0).unwrap());
        }
        t.clear().unwrap();
        assert!(t.is_empty().unwrap());
        assert_eq!(t.find(5).unwrap(), Vec::<i64>::new());

        assert!(t.insert(5, 5).unwrap());
        assert_eq!(t.find(5).unwrap(), vec![5]);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.db");

        {
            let bpm = Arc::new(BufferPoolManager::new(&path, 16, 2).unwrap());
            let t = BPlusTree::with_max_sizes(bpm, 3, 3).unwrap();
            for k in 0..100u64 {
                assert!(t.insert(k, k as i64 * 2).unwrap());
            }
            t.flush().unwrap();
        }

        let bpm = Arc::new(BufferPoolManager::new(&path, 16, 2).unwrap());
        assert!(!bpm.is_new());
        let t = BPlusTree::with_max_sizes(bpm, 3, 3).unwrap();
        for k in 0..100u64 {
            assert_eq!(t.find(k).unwrap(), vec![k as i64 * 2], "key {k}");
        }
    }

    #[test]
    fn test_tree_larger_than_pool() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spill.db");
        // Far fewer frames than pages, but enough headroom for a fully
        // retained root-to-leaf write path.
        let bpm = Arc::new(BufferPoolManager::new(path, 12, 2).unwrap());
        let t = BPlusTree::with_max_sizes(bpm, 3, 3).unwrap();

        for k in 0..300u64 {
            assert!(t.insert(k, k as i64).unwrap(), "key {k}");
        }
        for k in 0..300u64 {
            assert_eq!(t.find(k).unwrap(), vec![k as i64], "key {k}");
        }
    }

    #[test]
    fn test_concurrent_disjoint_inserts() {
        use std::thread;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mt.db");
        let bpm = Arc::new(BufferPoolManager::new(path, 32, 2).unwrap());
        let t = Arc::new(BPlusTree::with_max_sizes(bpm, 4, 4).unwrap());

        let mut handles = Vec::new();
        for tid in 0..4u64 {
            let t = Arc::clone(&t);
            handles.push(thread::spawn(move || {
                for i in 0..100u64 {
                    let key = tid * 1000 + i;
                    assert!(t.insert(key, key as i64).unwrap());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for tid in 0..4u64 {
            for i in 0..100u64 {
                let key = tid * 1000 + i;
                assert_eq!(t.find(key).unwrap(), vec![key as i64]);
            }
        }
        assert_eq!(t.begin().unwrap().count(), 400);
    }
}
