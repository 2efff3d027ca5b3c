//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::Path;

use tarlite::{Archive, ArchiveMode, Compression, EntryMode};

/// Size of a header block and the payload alignment unit.
pub const BLOCK: usize = 512;

/// Writes an archive at `path` with one buffered entry per `(name, data)` pair.
pub fn write_archive(
    path: &Path,
    compression: Compression,
    entries: &[(&str, &[u8])],
) -> tarlite::Result<()> {
    let mut archive = Archive::open(path, ArchiveMode::Write, compression)?;
    for (name, data) in entries {
        let mut entry = archive.entry_open(name, EntryMode::Write, None)?;
        entry.write(data)?;
        archive.entry_close(entry)?;
    }
    archive.close()
}

/// Reads the whole payload of entry `name`.
pub fn read_entry(archive: &mut Archive, name: &str) -> tarlite::Result<Vec<u8>> {
    let mut entry = archive.entry_open(name, EntryMode::Read, None)?;
    let mut data = vec![0u8; entry.size() as usize];
    let n = entry.read(&mut data)?;
    data.truncate(n);
    Ok(data)
}

/// Generates `len` bytes of deterministic, non-repeating-looking data.
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(u32::from(seed)) as u8)
        .collect()
}

/// Returns the names stored in the archive, in order.
pub fn names(path: &Path) -> Vec<String> {
    let archive = Archive::open(path, ArchiveMode::Read, Compression::Auto)
        .expect("archive should open for read");
    archive.entries().into_iter().map(|e| e.name).collect()
}
