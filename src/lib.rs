//! # tarlite
//!
//! A sequential, tar-style archive library with streamed and buffered
//! entries.
//!
//! Archives are written and read incrementally over one linear byte stream,
//! optionally wrapped in gzip. Many entries may be open at once against the
//! same archive; the library decides how each write-mode entry reaches
//! storage so that the stream never interleaves two members.
//!
//! ## Quick Start
//!
//! ### Writing an Archive
//!
//! ```rust,no_run
//! use tarlite::{Archive, ArchiveMode, Compression, EntryMode, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open("assets.tar", ArchiveMode::Write, Compression::Plain)?;
//!
//!     // Known size: streamed straight to disk
//!     let mut texture = archive.entry_open("texture.bin", EntryMode::Write, Some(4096))?;
//!     texture.write(&[0u8; 4096])?;
//!
//!     // Unknown size: buffered in memory until closed
//!     let mut notes = archive.entry_open("notes.txt", EntryMode::Write, None)?;
//!     notes.write(b"hello")?;
//!     archive.entry_close(notes)?;
//!
//!     archive.close()
//! }
//! ```
//!
//! ### Reading an Archive
//!
//! ```rust,no_run
//! use tarlite::{Archive, ArchiveMode, Compression, EntryMode, Result};
//!
//! fn main() -> Result<()> {
//!     // Gzip is detected from the file contents
//!     let mut archive = Archive::open("assets.tar", ArchiveMode::Read, Compression::Auto)?;
//!
//!     let mut name = archive.find_first("*.bin");
//!     while let Some(found) = name {
//!         let mut entry = archive.entry_open(&found, EntryMode::Read, None)?;
//!         let mut data = vec![0u8; entry.size() as usize];
//!         entry.read(&mut data)?;
//!         println!("{}: {} bytes", found, data.len());
//!         name = archive.find_next();
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Buffering Strategies
//!
//! | Strategy | Chosen when | Payload path |
//! |----------|-------------|--------------|
//! | [`Strategy::Streamed`] | [`EntryMode::Write`] with a size hint and no other entry streaming | Header at open, payload through a fixed working buffer |
//! | [`Strategy::Buffered`] | Otherwise | Whole payload in memory, written (or queued) at close |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `gzip` | Yes | Gzip-wrapped archive streams via `flate2` |
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod archive;
pub mod config;
pub mod error;
pub mod glob;
pub mod header;
pub mod transport;

pub use archive::{Archive, ArchiveMode, DirEntry, Entry, EntryMode, Strategy};
pub use config::ArchiveConfig;
pub use error::{Error, Result};
pub use header::{HeaderCodec, HeaderRecord};
pub use transport::Compression;
