use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{Entry, Result};
use crate::storage::page::LeafPageRef;

/// Forward cursor over the leaf chain.
///
/// Holds a pin and a shared latch on the current leaf only. Crossing a leaf
/// boundary releases that latch before taking the sibling's, so a cursor
/// can never close a latch cycle against a writer working right to left.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    guard: Option<ReadPageGuard>,
    pos: usize,
}

impl IndexIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, guard: ReadPageGuard, pos: usize) -> Result<Self> {
        let mut iter = Self {
            bpm,
            guard: Some(guard),
            pos,
        };
        iter.skip_exhausted()?;
        Ok(iter)
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            guard: None,
            pos: 0,
        }
    }

    pub fn is_end(&self) -> bool {
        self.guard.is_none()
    }

    /// Entry under the cursor; None once past the end.
    pub fn entry(&self) -> Option<Entry> {
        let guard = self.guard.as_ref()?;
        Some(LeafPageRef::new(guard.data()).entry_at(self.pos))
    }

    /// Steps to the next entry, following the sibling pointer across leaf
    /// boundaries. A no-op at the end.
    pub fn advance(&mut self) -> Result<()> {
        if self.guard.is_some() {
            self.pos += 1;
            self.skip_exhausted()?;
        }
        Ok(())
    }

    /// Moves to the next leaf while the position sits past the current
    /// leaf's entries, ending the cursor when the chain runs out.
    fn skip_exhausted(&mut self) -> Result<()> {
        loop {
            let next = match &self.guard {
                None => return Ok(()),
                Some(guard) => {
                    let view = LeafPageRef::new(guard.data());
                    if self.pos < view.size() {
                        return Ok(());
                    }
                    view.next_page_id()
                }
            };
            // Release the current leaf before touching the sibling.
            self.guard = None;
            self.pos = 0;
            match next {
                Some(page_id) => self.guard = Some(self.bpm.fetch_page_read(page_id)?),
                None => return Ok(()),
            }
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entry()?;
        match self.advance() {
            Ok(()) => Some(Ok(entry)),
            Err(e) => Some(Err(e)),
        }
    }
}
