//! Entry handles and their data path.

use std::cell::RefCell;
use std::io::{self, SeekFrom};
use std::rc::{Rc, Weak};

use super::queue::EntryId;
use super::{ArchiveState, Strategy};
use crate::header::{self, HeaderRecord};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EntryKind {
    Read,
    Streamed,
    Buffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EntryStatus {
    Open,
    Erased,
    Closed,
}

/// Per-entry state, shared between the [`Entry`] handle and the archive's
/// table of open entries.
///
/// `position` is the read cursor for read entries, the number of accepted
/// bytes for streamed entries and the buffer length for buffered entries.
/// `buffer` is the whole payload for buffered entries and the unflushed
/// working buffer for streamed ones.
#[derive(Debug)]
pub(crate) struct EntryState {
    pub(super) id: EntryId,
    pub(super) header: HeaderRecord,
    pub(super) kind: EntryKind,
    pub(super) position: u64,
    pub(super) buffer: Vec<u8>,
    pub(super) status: EntryStatus,
}

impl EntryState {
    pub(super) fn new(id: EntryId, header: HeaderRecord, kind: EntryKind) -> Self {
        Self {
            id,
            header,
            kind,
            position: 0,
            buffer: Vec::new(),
            status: EntryStatus::Open,
        }
    }

    fn write(&mut self, archive: &mut ArchiveState, data: &[u8]) -> Result<usize> {
        if self.kind == EntryKind::Read {
            return Err(Error::invalid_operation("write", "entry is open for read"));
        }
        if self.status != EntryStatus::Open {
            return Ok(0);
        }

        match self.kind {
            EntryKind::Buffered => {
                let required = self.buffer.len() + data.len();
                if required > self.buffer.capacity() {
                    let capacity = archive.config.buffer_capacity_for(required);
                    self.buffer.reserve_exact(capacity - self.buffer.len());
                }
                self.buffer.extend_from_slice(data);
                self.position = self.buffer.len() as u64;
                self.header.size = self.position;
                Ok(data.len())
            }
            _ => self.write_streamed(archive, data),
        }
    }

    /// Copies `data` through the fixed working buffer, clipped to the
    /// declared size. Reaching the declared size closes the entry.
    fn write_streamed(&mut self, archive: &mut ArchiveState, data: &[u8]) -> Result<usize> {
        let remaining = self.header.size - self.position;
        let accepted = usize::try_from(remaining).map_or(data.len(), |r| r.min(data.len()));
        let limit = archive.config.stream_buffer_size;

        let mut rest = &data[..accepted];
        while !rest.is_empty() {
            let n = (limit - self.buffer.len()).min(rest.len());
            self.buffer.extend_from_slice(&rest[..n]);
            self.position += n as u64;
            rest = &rest[n..];
            if self.buffer.len() >= limit {
                self.flush_stream(archive)?;
            }
        }

        if self.position == self.header.size {
            log::debug!("streamed entry '{}' complete", self.header.name);
            archive.close_entry(self)?;
        }
        Ok(accepted)
    }

    /// Writes the working buffer of a streamed entry to the transport.
    pub(super) fn flush_stream(&mut self, archive: &mut ArchiveState) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let n = archive.transport.write(&self.buffer)?;
        if n < self.buffer.len() {
            return Err(Error::short_io("payload flush", self.buffer.len(), n));
        }
        self.buffer.clear();
        Ok(())
    }

    fn read(&mut self, archive: &mut ArchiveState, buf: &mut [u8]) -> Result<usize> {
        if self.kind != EntryKind::Read {
            return Err(Error::invalid_operation("read", "entry is open for write"));
        }
        let available = self.header.size.saturating_sub(self.position);
        let want = usize::try_from(available).map_or(buf.len(), |a| a.min(buf.len()));
        if want == 0 {
            return Ok(0);
        }
        let n = archive
            .transport
            .read_at(&mut buf[..want], self.header.offset.saturating_add(self.position))?;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> Result<u64> {
        if self.kind != EntryKind::Read {
            return Err(Error::invalid_operation("seek", "entry is open for write"));
        }
        self.position = offset.min(self.header.size);
        Ok(self.position)
    }

    fn flush(&mut self, archive: &mut ArchiveState) -> Result<()> {
        if self.kind == EntryKind::Streamed && self.status == EntryStatus::Open {
            self.flush_stream(archive)?;
        }
        Ok(())
    }

    fn check_editable(&self, operation: &'static str) -> Result<()> {
        match (self.kind, self.status) {
            (EntryKind::Buffered, EntryStatus::Open) => Ok(()),
            (EntryKind::Buffered, _) => Err(Error::invalid_operation(
                operation,
                "entry was already erased or flushed",
            )),
            (EntryKind::Streamed, _) => {
                Err(Error::invalid_operation(operation, "entry is streamed"))
            }
            (EntryKind::Read, _) => {
                Err(Error::invalid_operation(operation, "entry is open for read"))
            }
        }
    }
}

/// A named member of an [`Archive`](super::Archive).
///
/// Read entries read and seek within the member's payload. Write entries
/// accept data according to their [`Strategy`]. An entry that is dropped
/// while open is closed implicitly; errors from that implicit close are
/// logged, so call [`close`](Self::close) to observe them.
#[derive(Debug)]
pub struct Entry {
    state: Rc<RefCell<EntryState>>,
    archive: Weak<RefCell<ArchiveState>>,
}

impl Entry {
    pub(super) fn new(state: Rc<RefCell<EntryState>>, archive: Weak<RefCell<ArchiveState>>) -> Self {
        Self { state, archive }
    }

    pub(super) fn archive(&self) -> &Weak<RefCell<ArchiveState>> {
        &self.archive
    }

    /// Runs `op` against the live archive, or returns `idle` if the archive
    /// has been closed or dropped.
    fn with_archive<T>(
        &self,
        idle: T,
        op: impl FnOnce(&mut EntryState, &mut ArchiveState) -> Result<T>,
    ) -> Result<T> {
        let Some(shared) = self.archive.upgrade() else {
            return Ok(idle);
        };
        let mut archive = shared.borrow_mut();
        let mut entry = self.state.borrow_mut();
        op(&mut *entry, &mut *archive)
    }

    /// Reads from the current position. Returns the number of bytes read,
    /// which is 0 at the end of the entry.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if the entry is open for write.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.with_archive(0, |entry, archive| entry.read(archive, buf))
    }

    /// Writes `data` and returns how many bytes were accepted.
    ///
    /// A streamed entry accepts at most its declared size and closes
    /// itself once that size is reached. Writing to a closed or erased
    /// entry accepts nothing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if the entry is open for read.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.with_archive(0, |entry, archive| entry.write(archive, data))
    }

    /// Moves the read cursor to `offset` within the entry, clamped to the
    /// entry size. Returns the new position.
    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        let position = self.position();
        self.with_archive(position, |entry, _| entry.seek(offset))
    }

    /// Writes the working buffer of a streamed entry through to storage.
    /// Does nothing for other entries.
    pub fn flush(&mut self) -> Result<()> {
        self.with_archive((), |entry, archive| entry.flush(archive))
    }

    /// Bytes written so far for a streamed entry; otherwise the entry size.
    pub fn size(&self) -> u64 {
        let state = self.state.borrow();
        match state.kind {
            EntryKind::Streamed => state.position,
            _ => state.header.size,
        }
    }

    /// Discards a buffered entry: closing it will write nothing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] unless the entry is a buffered write
    /// entry that is still open.
    pub fn erase(&mut self) -> Result<()> {
        self.with_archive((), |entry, _| {
            entry.check_editable("erase")?;
            entry.status = EntryStatus::Erased;
            entry.buffer = Vec::new();
            Ok(())
        })
    }

    /// Renames a buffered entry before it is written.
    ///
    /// The new name is reduced to its base component like any other entry
    /// name.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.with_archive((), |entry, _| {
            entry.check_editable("rename")?;
            entry.header.name = header::strip_name(name)?;
            Ok(())
        })
    }

    /// Returns `true` if the entry was opened for reading.
    pub fn is_read_entry(&self) -> bool {
        self.state.borrow().kind == EntryKind::Read
    }

    /// Returns the entry name.
    pub fn name(&self) -> String {
        self.state.borrow().header.name.clone()
    }

    /// Returns the read cursor, or the number of bytes written.
    pub fn position(&self) -> u64 {
        self.state.borrow().position
    }

    /// Returns the buffering strategy of a write entry.
    pub fn strategy(&self) -> Option<Strategy> {
        match self.state.borrow().kind {
            EntryKind::Read => None,
            EntryKind::Streamed => Some(Strategy::Streamed),
            EntryKind::Buffered => Some(Strategy::Buffered),
        }
    }

    /// Returns `true` once the entry has been closed, including a streamed
    /// entry that reached its declared size.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().status == EntryStatus::Closed
    }

    /// Closes the entry.
    ///
    /// A streamed entry flushes its remaining bytes and releases the
    /// stream. A buffered entry is written now, or queued if another entry
    /// is streaming. Queued entries are written once the stream is free.
    pub fn close(self) -> Result<()> {
        self.with_archive((), |entry, archive| archive.close_entry(entry))
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        let Some(shared) = self.archive.upgrade() else {
            return;
        };
        let (Ok(mut archive), Ok(mut state)) = (shared.try_borrow_mut(), self.state.try_borrow_mut())
        else {
            log::warn!("entry dropped while its archive is in use; skipping implicit close");
            return;
        };
        if let Err(e) = archive.close_entry(&mut state) {
            log::warn!("implicit close of entry '{}' failed: {}", state.header.name, e);
        }
    }
}

impl io::Read for Entry {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Entry::read(self, buf)?)
    }
}

impl io::Write for Entry {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Entry::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Entry::flush(self)?)
    }
}

impl io::Seek for Entry {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position().checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        Ok(Entry::seek(self, target)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, Write};

    use tempfile::tempdir;

    use super::*;
    use crate::config::ArchiveConfig;
    use crate::{Archive, ArchiveMode, Compression, EntryMode};

    fn small_config() -> ArchiveConfig {
        ArchiveConfig::new()
            .stream_buffer_size(16)
            .buffer_classes(8, 32, 64)
    }

    #[test]
    fn test_buffered_growth_follows_size_classes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growth.tar");
        let mut archive =
            Archive::open_with_config(&path, ArchiveMode::Write, Compression::Plain, small_config())
                .unwrap();
        let mut entry = archive.entry_open("grow.bin", EntryMode::Write, None).unwrap();

        entry.write(&[1; 5]).unwrap();
        assert_eq!(entry.state.borrow().buffer.capacity(), 8);
        entry.write(&[2; 10]).unwrap();
        assert_eq!(entry.state.borrow().buffer.capacity(), 32);
        entry.write(&[3; 40]).unwrap();
        assert_eq!(entry.state.borrow().buffer.capacity(), 64);
        assert_eq!(entry.size(), 55);
    }

    #[test]
    fn test_streamed_write_is_clipped_and_auto_closes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.tar");
        let mut archive =
            Archive::open_with_config(&path, ArchiveMode::Write, Compression::Plain, small_config())
                .unwrap();
        let mut entry = archive.entry_open("clip.bin", EntryMode::Write, Some(40)).unwrap();

        assert_eq!(entry.write(&[7; 30]).unwrap(), 30);
        assert_eq!(entry.size(), 30);
        assert!(!entry.is_closed());
        assert_eq!(entry.write(&[7; 30]).unwrap(), 10);
        assert!(entry.is_closed());
        assert!(!archive.is_streaming());
        assert_eq!(entry.write(&[7; 5]).unwrap(), 0);
        assert_eq!(entry.size(), 40);
    }

    #[test]
    fn test_streamed_flush_reaches_storage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flush.tar");
        let mut archive = Archive::open(&path, ArchiveMode::Write, Compression::Plain).unwrap();
        let mut entry = archive.entry_open("log.txt", EntryMode::Write, Some(100)).unwrap();

        entry.write(b"early").unwrap();
        entry.flush().unwrap();
        archive.shared.borrow_mut().transport.close().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len(), 512 + 5);
        assert_eq!(&raw[512..], b"early");
    }

    #[test]
    fn test_erase_and_rename() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edit.tar");
        let mut archive = Archive::open(&path, ArchiveMode::Write, Compression::Plain).unwrap();

        let mut gone = archive.entry_open("gone.txt", EntryMode::Write, None).unwrap();
        gone.write(b"discard me").unwrap();
        gone.erase().unwrap();
        assert!(gone.erase().is_err());
        assert!(gone.rename("other.txt").is_err());
        assert_eq!(gone.write(b"more").unwrap(), 0);
        gone.close().unwrap();

        let mut renamed = archive
            .entry_open("draft.txt", EntryMode::WriteBuffered, Some(5))
            .unwrap();
        renamed.write(b"final").unwrap();
        renamed.rename("sub/final.txt").unwrap();
        assert_eq!(renamed.name(), "final.txt");
        renamed.close().unwrap();

        let mut streamed = archive.entry_open("s.bin", EntryMode::Write, Some(4)).unwrap();
        assert!(streamed.erase().unwrap_err().is_usage_error());
        assert!(streamed.rename("t.bin").unwrap_err().is_usage_error());
        streamed.write(b"abcd").unwrap();
        archive.close().unwrap();

        let archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
        let names: Vec<_> = archive.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["final.txt", "s.bin"]);
    }

    #[test]
    fn test_read_seek_and_io_traits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("read.tar");
        let mut archive = Archive::open(&path, ArchiveMode::Write, Compression::Plain).unwrap();
        let mut entry = archive.entry_open("digits.txt", EntryMode::Write, None).unwrap();
        entry.write_all(b"0123456789").unwrap();
        drop(entry);
        archive.close().unwrap();

        let mut archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
        let mut entry = archive.entry_open("digits.txt", EntryMode::Read, None).unwrap();
        assert!(entry.is_read_entry());
        assert_eq!(entry.strategy(), None);
        assert_eq!(entry.size(), 10);

        assert_eq!(Entry::seek(&mut entry, 7).unwrap(), 7);
        let mut buf = [0u8; 8];
        assert_eq!(Entry::read(&mut entry, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"789");
        assert_eq!(Entry::read(&mut entry, &mut buf).unwrap(), 0);

        // Clamped to the entry size
        assert_eq!(Entry::seek(&mut entry, 50).unwrap(), 10);

        Seek::seek(&mut entry, SeekFrom::End(-4)).unwrap();
        let mut tail = String::new();
        entry.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "6789");
        assert!(Seek::seek(&mut entry, SeekFrom::Current(-20)).is_err());

        assert!(Entry::write(&mut entry, b"x").unwrap_err().is_usage_error());
    }

    #[test]
    fn test_write_entry_rejects_read_and_seek() {
        let dir = tempdir().unwrap();
        let mut archive =
            Archive::open(dir.path().join("w.tar"), ArchiveMode::Write, Compression::Plain).unwrap();
        let mut entry = archive.entry_open("w.bin", EntryMode::Write, None).unwrap();
        let mut buf = [0u8; 4];
        assert!(Entry::read(&mut entry, &mut buf).unwrap_err().is_usage_error());
        assert!(Entry::seek(&mut entry, 0).unwrap_err().is_usage_error());
    }

    #[test]
    fn test_entry_outliving_archive_is_inert() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orphan.tar");
        let mut archive = Archive::open(&path, ArchiveMode::Write, Compression::Plain).unwrap();
        let mut entry = archive.entry_open("orphan.bin", EntryMode::Write, None).unwrap();
        entry.write(b"before").unwrap();
        archive.close().unwrap();

        assert_eq!(entry.write(b"after").unwrap(), 0);
        entry.flush().unwrap();
        entry.erase().unwrap();
        entry.close().unwrap();

        let archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
        assert_eq!(archive.entries()[0].size, 6);
    }
}
