//! The read-mode directory and its wildcard search cursor.

use std::io::SeekFrom;

use crate::glob::GlobMatcher;
use crate::header::{self, BLOCK_SIZE, DecodedBlock, HeaderCodec, HeaderRecord};
use crate::transport::Transport;
use crate::{Error, Result};

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (base component only).
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Offset of the first payload byte in the uncompressed stream.
    pub offset: u64,
}

impl From<&HeaderRecord> for DirEntry {
    fn from(record: &HeaderRecord) -> Self {
        Self {
            name: record.name.clone(),
            size: record.size,
            offset: record.offset,
        }
    }
}

#[derive(Debug)]
struct FindCursor {
    matcher: GlobMatcher,
    next: usize,
}

/// Ordered header records of a read-mode archive.
///
/// Built once by [`Directory::scan`] and immutable afterwards, apart from the
/// search cursor.
#[derive(Debug, Default)]
pub(crate) struct Directory {
    entries: Vec<HeaderRecord>,
    cursor: Option<FindCursor>,
}

impl Directory {
    /// Walks the stream from offset 0, collecting one record per header,
    /// until a block decodes as end of directory. Leaves the transport
    /// rewound to 0.
    pub(crate) fn scan(transport: &mut Transport, codec: &HeaderCodec, verify: bool) -> Result<Self> {
        let mut entries = Vec::new();
        let mut cursor = 0u64;
        let mut block = [0u8; BLOCK_SIZE];

        transport.seek(SeekFrom::Start(0))?;
        loop {
            let n = transport.read(&mut block)?;
            if n == 0 {
                log::debug!("stream ended at {} without trailer blocks", cursor);
                break;
            }
            if n < BLOCK_SIZE {
                return Err(Error::short_io("header read", BLOCK_SIZE, n));
            }

            let mut record = match codec.decode(&block) {
                DecodedBlock::Record(record) => record,
                DecodedBlock::EndOfDirectory => break,
            };
            if verify && !header::verify(&block) {
                return Err(Error::corrupt_header(cursor, "checksum mismatch"));
            }

            record.offset = cursor + BLOCK_SIZE as u64;
            cursor = record.offset.saturating_add(record.padded_size());

            let base = header::base_name(&record.name);
            if base.is_empty() {
                log::trace!("skipping directory record '{}'", record.name);
            } else {
                record.name = base.to_string();
                entries.push(record);
            }

            if transport.seek(SeekFrom::Start(cursor))? != cursor {
                // Payload runs past the end of a compressed stream.
                break;
            }
        }
        transport.seek(SeekFrom::Start(0))?;

        log::debug!("scanned {} entries", entries.len());
        Ok(Self {
            entries,
            cursor: None,
        })
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&HeaderRecord> {
        let name = header::base_name(name);
        self.entries.iter().find(|record| record.name == name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = DirEntry> + '_ {
        self.entries.iter().map(DirEntry::from)
    }

    /// Starts a new search, replacing any previous cursor.
    pub(crate) fn find_first(&mut self, pattern: &str) -> Option<String> {
        self.cursor = Some(FindCursor {
            matcher: GlobMatcher::new(pattern),
            next: 0,
        });
        self.find_next()
    }

    /// Continues the current search. `None` once it is exhausted or if no
    /// search was started.
    pub(crate) fn find_next(&mut self) -> Option<String> {
        let cursor = self.cursor.as_mut()?;
        while let Some(record) = self.entries.get(cursor.next) {
            cursor.next += 1;
            if cursor.matcher.is_match(&record.name) {
                return Some(record.name.clone());
            }
        }
        None
    }
}
