//! Write scheduling: the single stream-writer slot and the pending-flush queue.
//!
//! All entries of an archive share one linear output stream, so at most one
//! entry may write to it incrementally at a time. That entry holds the
//! [`StreamSlot`]. Buffered entries that close while the slot is held are
//! detached into the [`PendingQueue`] and written, in FIFO order, once the
//! slot becomes vacant.

use std::collections::VecDeque;

use crate::header::HeaderRecord;

/// Identifier of an entry within its archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct EntryId(pub(crate) u64);

/// Admission token for the active stream-writer.
#[derive(Debug, Default)]
pub(crate) struct StreamSlot {
    holder: Option<EntryId>,
}

impl StreamSlot {
    pub(crate) fn is_vacant(&self) -> bool {
        self.holder.is_none()
    }

    pub(crate) fn holder(&self) -> Option<EntryId> {
        self.holder
    }

    /// Takes the slot for `id`. Fails if another entry holds it.
    pub(crate) fn try_acquire(&mut self, id: EntryId) -> bool {
        match self.holder {
            None => {
                self.holder = Some(id);
                true
            }
            Some(current) => current == id,
        }
    }

    /// Vacates the slot if `id` holds it. Returns whether it did.
    pub(crate) fn release(&mut self, id: EntryId) -> bool {
        if self.holder == Some(id) {
            self.holder = None;
            true
        } else {
            false
        }
    }
}

/// A buffered entry detached from its handle, waiting to be written.
#[derive(Debug)]
pub(crate) struct PendingFlush {
    pub(crate) header: HeaderRecord,
    pub(crate) data: Vec<u8>,
}

/// FIFO of detached buffered entries.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    items: VecDeque<PendingFlush>,
}

impl PendingQueue {
    pub(crate) fn push(&mut self, header: HeaderRecord, data: Vec<u8>) {
        self.items.push_back(PendingFlush { header, data });
    }

    pub(crate) fn pop(&mut self) -> Option<PendingFlush> {
        self.items.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
