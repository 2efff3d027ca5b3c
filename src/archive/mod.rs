//! Archive lifecycle and write scheduling.
//!
//! An [`Archive`] is opened either for reading or for writing. In read mode
//! the whole stream is scanned once at open and the resulting directory
//! serves every lookup. In write mode entries are appended to one linear
//! stream, and each write-mode [`Entry`] gets one of two buffering strategies:
//!
//! - [`Strategy::Streamed`]: the header is written at open and payload bytes
//!   go to the transport as they arrive. Requires a size hint, and only one
//!   entry may hold the stream at a time.
//! - [`Strategy::Buffered`]: the payload accumulates in memory and the whole
//!   member is written at close. If another entry is streaming at that
//!   moment, the member waits in a FIFO queue until the stream is released.
//!
//! # Example
//!
//! ```rust,no_run
//! use tarlite::{Archive, ArchiveMode, Compression, EntryMode};
//!
//! # fn main() -> tarlite::Result<()> {
//! let mut archive = Archive::open("bundle.tar.gz", ArchiveMode::Write, Compression::Gzip)?;
//!
//! let mut big = archive.entry_open("alpha.bin", EntryMode::Write, Some(4096))?;
//! big.write(&[0xAA; 4000])?;
//!
//! // Streaming slot is taken, so this one is buffered and queued at close
//! let mut small = archive.entry_open("beta.bin", EntryMode::Write, Some(10))?;
//! small.write(b"0123456789")?;
//! archive.entry_close(small)?;
//!
//! // Reaching the declared size closes alpha.bin and drains the queue
//! big.write(&[0xAA; 96])?;
//! archive.close()?;
//! # Ok(())
//! # }
//! ```

mod directory;
mod entry;
mod queue;

pub use directory::DirEntry;
pub use entry::Entry;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use crate::config::ArchiveConfig;
use crate::header::{self, BLOCK_SIZE, HeaderCodec, HeaderRecord};
use crate::transport::{Compression, Transport};
use crate::{Error, Result};

use directory::Directory;
use entry::{EntryKind, EntryState, EntryStatus};
use queue::{EntryId, PendingQueue, StreamSlot};

/// Direction an archive is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Scan an existing archive and read its entries.
    Read,
    /// Create (or truncate) an archive and append entries.
    Write,
}

impl ArchiveMode {
    fn as_str(self) -> &'static str {
        match self {
            ArchiveMode::Read => "read",
            ArchiveMode::Write => "write",
        }
    }
}

/// How an entry is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Read an existing entry.
    Read,
    /// Write a new entry, streaming it when possible.
    Write,
    /// Write a new entry, always accumulating it in memory.
    WriteBuffered,
}

/// Buffering strategy chosen for a write-mode entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Payload is written to the transport incrementally.
    Streamed,
    /// Payload is held in memory until the entry is closed.
    Buffered,
}

const TRAILER: [u8; 2 * BLOCK_SIZE] = [0u8; 2 * BLOCK_SIZE];

/// State shared between an [`Archive`] and its entries.
#[derive(Debug)]
pub(crate) struct ArchiveState {
    path: PathBuf,
    mode: ArchiveMode,
    transport: Transport,
    config: ArchiveConfig,
    codec: HeaderCodec,
    directory: Directory,
    slot: StreamSlot,
    pending: PendingQueue,
    open: BTreeMap<EntryId, Rc<RefCell<EntryState>>>,
    next_id: u64,
}

impl ArchiveState {
    fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }

    fn open_entry(
        &mut self,
        name: &str,
        mode: EntryMode,
        size_hint: Option<u64>,
    ) -> Result<Rc<RefCell<EntryState>>> {
        let state = match (self.mode, mode) {
            (ArchiveMode::Read, EntryMode::Read) => {
                let header = self
                    .directory
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| Error::not_found(name))?;
                EntryState::new(self.allocate_id(), header, EntryKind::Read)
            }
            (ArchiveMode::Read, _) => {
                return Err(Error::mode_conflict("open an entry for write", "read"));
            }
            (ArchiveMode::Write, EntryMode::Read) => {
                return Err(Error::mode_conflict("open an entry for read", "write"));
            }
            (ArchiveMode::Write, mode) => self.open_write_entry(name, mode, size_hint)?,
        };

        let state = Rc::new(RefCell::new(state));
        let (id, status) = {
            let s = state.borrow();
            (s.id, s.status)
        };
        if status == EntryStatus::Open {
            self.open.insert(id, Rc::clone(&state));
        }
        Ok(state)
    }

    fn open_write_entry(
        &mut self,
        name: &str,
        mode: EntryMode,
        size_hint: Option<u64>,
    ) -> Result<EntryState> {
        let mut header = HeaderRecord::new(name, 0)?;
        let id = self.allocate_id();

        let size = match size_hint {
            Some(size) if mode == EntryMode::Write && self.slot.is_vacant() => size,
            _ => {
                log::debug!("entry '{}' is buffered", header.name);
                return Ok(EntryState::new(id, header, EntryKind::Buffered));
            }
        };
        if size > self.codec.max_size() {
            return Err(Error::SizeTooLarge {
                size,
                max: self.codec.max_size(),
            });
        }

        header.size = size;
        self.pad_to_block()?;
        self.write_header(&mut header)?;
        log::debug!(
            "entry '{}' is streamed ({} bytes at offset {})",
            header.name,
            size,
            header.offset
        );

        let mut state = EntryState::new(id, header, EntryKind::Streamed);
        if size == 0 {
            state.status = EntryStatus::Closed;
        } else {
            self.slot.try_acquire(id);
            let capacity = usize::try_from(size).unwrap_or(usize::MAX);
            state.buffer = Vec::with_capacity(self.config.stream_buffer_size.min(capacity));
        }
        Ok(state)
    }

    /// Closes `entry` according to its strategy, then drains the pending
    /// queue if the stream is free. Closing twice is a no-op.
    pub(crate) fn close_entry(&mut self, entry: &mut EntryState) -> Result<()> {
        if entry.status == EntryStatus::Closed {
            return Ok(());
        }
        self.open.remove(&entry.id);
        let status = std::mem::replace(&mut entry.status, EntryStatus::Closed);

        let result = match entry.kind {
            EntryKind::Read => Ok(()),
            EntryKind::Streamed => {
                let result = self.finish_stream(entry);
                self.slot.release(entry.id);
                result
            }
            EntryKind::Buffered if status == EntryStatus::Erased => {
                log::debug!("dropping erased entry '{}'", entry.header.name);
                Ok(())
            }
            EntryKind::Buffered => {
                let data = std::mem::take(&mut entry.buffer);
                let header = HeaderRecord {
                    size: data.len() as u64,
                    ..entry.header.clone()
                };
                if self.slot.is_vacant() {
                    self.write_member(header, &data)
                } else {
                    log::debug!(
                        "queueing '{}' ({} bytes) behind the active stream",
                        header.name,
                        data.len()
                    );
                    self.pending.push(header, data);
                    Ok(())
                }
            }
        };

        let drained = if self.slot.is_vacant() && !self.pending.is_empty() {
            self.drain_pending()
        } else {
            Ok(())
        };
        result.and(drained)
    }

    fn finish_stream(&mut self, entry: &mut EntryState) -> Result<()> {
        entry.flush_stream(self)?;
        let shortfall = entry.header.size - entry.position;
        if shortfall > 0 {
            log::warn!(
                "streamed entry '{}' closed {} bytes short of its declared size; zero-filling",
                entry.header.name,
                shortfall
            );
            self.transport.zero_fill(shortfall, "stream fill")?;
            entry.position = entry.header.size;
        }
        self.pad_to_block()
    }

    /// Writes every queued entry in order. A failed member does not stop
    /// the drain; the first error is returned once the queue is empty.
    fn drain_pending(&mut self) -> Result<()> {
        let mut result = Ok(());
        while let Some(pending) = self.pending.pop() {
            log::debug!("draining queued entry '{}'", pending.header.name);
            let name = pending.header.name.clone();
            if let Err(e) = self.write_member(pending.header, &pending.data) {
                log::warn!("failed to write queued entry '{}': {}", name, e);
                result = result.and(Err(e));
            }
        }
        result
    }

    /// Writes a complete member: header, payload, padding.
    fn write_member(&mut self, mut header: HeaderRecord, data: &[u8]) -> Result<()> {
        self.pad_to_block()?;
        self.write_header(&mut header)?;
        let n = self.transport.write(data)?;
        if n < data.len() {
            return Err(Error::short_io("payload write", data.len(), n));
        }
        self.pad_to_block()
    }

    fn write_header(&mut self, header: &mut HeaderRecord) -> Result<()> {
        let block = self.codec.encode(header)?;
        let n = self.transport.write(&block)?;
        if n < BLOCK_SIZE {
            return Err(Error::short_io("header write", BLOCK_SIZE, n));
        }
        header.offset = self.transport.position();
        Ok(())
    }

    fn pad_to_block(&mut self) -> Result<()> {
        let position = self.transport.position();
        let padding = header::round_up_block(position) - position;
        self.transport.zero_fill(padding, "padding write")
    }

    /// Closes every entry, writes the trailer and closes the transport.
    /// Returns the first error encountered; later steps still run.
    fn finish(&mut self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        let mut record = |result: Result<()>| {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        };

        if let Some(entry) = self
            .slot
            .holder()
            .and_then(|id| self.open.get(&id))
            .cloned()
        {
            record(self.close_entry(&mut entry.borrow_mut()));
        }
        for (_, entry) in std::mem::take(&mut self.open) {
            record(self.close_entry(&mut entry.borrow_mut()));
        }
        if self.slot.is_vacant() && !self.pending.is_empty() {
            record(self.drain_pending());
        }

        if self.mode == ArchiveMode::Write {
            record(self.pad_to_block());
            record(match self.transport.write(&TRAILER) {
                Ok(n) if n < TRAILER.len() => {
                    Err(Error::short_io("trailer write", TRAILER.len(), n))
                }
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            });
        }
        record(self.transport.close());

        log::debug!("closed archive '{}'", self.path.display());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A tar-like archive opened for reading or writing.
///
/// Entries borrow nothing from the archive: they keep a weak handle, so an
/// [`Entry`] may outlive its archive. Once the archive is closed or dropped,
/// every operation on a surviving entry is a no-op.
#[derive(Debug)]
pub struct Archive {
    shared: Rc<RefCell<ArchiveState>>,
    closed: bool,
}

impl Archive {
    /// Opens an archive with the default [`ArchiveConfig`].
    ///
    /// In read mode `compression` may be [`Compression::Auto`]; in write mode
    /// it must name the storage explicitly.
    ///
    /// # Errors
    ///
    /// - [`Error::OpenFailure`] if the file cannot be opened or created
    /// - [`Error::ModeConflict`] for [`Compression::Auto`] in write mode
    /// - [`Error::ShortIo`] if a header block is truncated during the scan
    pub fn open(path: impl AsRef<Path>, mode: ArchiveMode, compression: Compression) -> Result<Self> {
        Self::open_with_config(path, mode, compression, ArchiveConfig::default())
    }

    /// Opens an archive with a custom configuration.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        mode: ArchiveMode,
        compression: Compression,
        config: ArchiveConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let codec = config.codec();

        let (transport, directory) = match mode {
            ArchiveMode::Read => {
                let mut transport = Transport::open_read(path, compression)?;
                let directory = Directory::scan(&mut transport, &codec, config.verify_checksums)?;
                (transport, directory)
            }
            ArchiveMode::Write => {
                let transport = Transport::create(path, compression, config.compression_level)?;
                (transport, Directory::default())
            }
        };
        log::debug!(
            "opened archive '{}' for {} ({})",
            path.display(),
            mode.as_str(),
            if transport.is_compressed() { "gzip" } else { "plain" }
        );

        let state = ArchiveState {
            path: path.to_path_buf(),
            mode,
            transport,
            config,
            codec,
            directory,
            slot: StreamSlot::default(),
            pending: PendingQueue::default(),
            open: BTreeMap::new(),
            next_id: 0,
        };
        Ok(Self {
            shared: Rc::new(RefCell::new(state)),
            closed: false,
        })
    }

    /// Finalizes the archive.
    ///
    /// The streaming entry is closed first (which drains the pending
    /// queue), then every other open entry. In write mode the stream is
    /// padded and two zero blocks are appended. Outstanding [`Entry`]
    /// handles are detached.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.shared.borrow_mut().finish()
    }

    /// Opens an entry.
    ///
    /// For [`EntryMode::Read`], `name` is reduced to its base component and
    /// looked up in the directory. For write modes a new entry is created;
    /// it is streamed only for [`EntryMode::Write`] with a `size_hint` while
    /// no other entry is streaming, and buffered otherwise.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if a read entry does not exist
    /// - [`Error::ModeConflict`] if `mode` does not match the archive mode
    /// - [`Error::NameTooLong`] / [`Error::SizeTooLarge`] if the header cannot hold the entry
    /// - [`Error::ShortIo`] if the header of a streamed entry could not be written
    pub fn entry_open(&mut self, name: &str, mode: EntryMode, size_hint: Option<u64>) -> Result<Entry> {
        let state = self.shared.borrow_mut().open_entry(name, mode, size_hint)?;
        Ok(Entry::new(state, Rc::downgrade(&self.shared)))
    }

    /// Closes an entry. Equivalent to [`Entry::close`], but rejects entries
    /// that belong to a different archive.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] if `entry` belongs to another archive.
    /// The rejected entry is still dropped here, which closes it implicitly
    /// on the archive it belongs to.
    pub fn entry_close(&mut self, entry: Entry) -> Result<()> {
        if !Weak::ptr_eq(entry.archive(), &Rc::downgrade(&self.shared)) {
            return Err(Error::invalid_operation(
                "entry_close",
                "entry belongs to another archive",
            ));
        }
        entry.close()
    }

    /// Starts a wildcard search over the directory and returns the first
    /// matching name.
    pub fn find_first(&mut self, pattern: &str) -> Option<String> {
        self.shared.borrow_mut().directory.find_first(pattern)
    }

    /// Returns the next name matching the pattern of the last
    /// [`find_first`](Self::find_first) call.
    pub fn find_next(&mut self) -> Option<String> {
        self.shared.borrow_mut().directory.find_next()
    }

    /// Returns `true` if the directory holds an entry named `name`.
    pub fn exists(&self, name: &str) -> bool {
        self.shared.borrow().directory.lookup(name).is_some()
    }

    /// Lists the directory in archive order. Empty in write mode.
    pub fn entries(&self) -> Vec<DirEntry> {
        self.shared.borrow().directory.iter().collect()
    }

    /// Iterates over directory entries whose names match `pattern`.
    pub fn glob(&self, pattern: &str) -> impl Iterator<Item = DirEntry> + use<> {
        let matcher = crate::glob::GlobMatcher::new(pattern);
        self.entries()
            .into_iter()
            .filter(move |entry| matcher.is_match(&entry.name))
    }

    /// Returns the archive path.
    pub fn path(&self) -> PathBuf {
        self.shared.borrow().path.clone()
    }

    /// Returns the mode the archive was opened in.
    pub fn mode(&self) -> ArchiveMode {
        self.shared.borrow().mode
    }

    /// Returns `true` if the archive stream is gzip-compressed.
    pub fn is_compressed(&self) -> bool {
        self.shared.borrow().transport.is_compressed()
    }

    /// Number of entries currently open.
    pub fn open_entries(&self) -> usize {
        self.shared.borrow().open.len()
    }

    /// Number of buffered entries waiting for the stream.
    pub fn pending_flushes(&self) -> usize {
        self.shared.borrow().pending.len()
    }

    /// Returns `true` if an entry currently holds the stream.
    pub fn is_streaming(&self) -> bool {
        !self.shared.borrow().slot.is_vacant()
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(mut state) = self.shared.try_borrow_mut() else {
            log::warn!("archive dropped while in use; skipping finalization");
            return;
        };
        if let Err(e) = state.finish() {
            log::warn!("error closing archive '{}': {}", state.path.display(), e);
        }
    }
}
