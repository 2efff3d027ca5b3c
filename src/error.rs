//! Error types for archive operations.
//!
//! This module provides the [`Error`] enum which represents every failure
//! mode of the archive and entry API, along with a convenient [`Result<T>`]
//! type alias.
//!
//! # Error Handling
//!
//! ```rust,no_run
//! use tarlite::{Archive, ArchiveMode, Compression, EntryMode, Error};
//!
//! fn read_config(path: &str) -> tarlite::Result<Vec<u8>> {
//!     let mut archive = Archive::open(path, ArchiveMode::Read, Compression::Auto)?;
//!     match archive.entry_open("config.ini", EntryMode::Read, None) {
//!         Ok(mut entry) => {
//!             let mut data = vec![0u8; entry.size() as usize];
//!             entry.read(&mut data)?;
//!             Ok(data)
//!         }
//!         Err(Error::NotFound { .. }) => Ok(Vec::new()),
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;

/// The main error type for archive operations.
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`OpenFailure`][Self::OpenFailure], [`ShortIo`][Self::ShortIo] | Storage failures, truncation |
/// | Usage | [`ModeConflict`][Self::ModeConflict], [`InvalidOperation`][Self::InvalidOperation] | Calling an operation the entry or archive does not support |
/// | Limits | [`NameTooLong`][Self::NameTooLong], [`SizeTooLarge`][Self::SizeTooLarge] | Values the header record cannot hold |
/// | Lookup | [`NotFound`][Self::NotFound] | Missing entry name |
/// | Integrity | [`CorruptHeader`][Self::CorruptHeader] | Checksum mismatch (when verification is on) |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred in the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive file could not be opened or created.
    #[error("failed to open archive '{}': {source}", path.display())]
    OpenFailure {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The operation does not match the mode the archive or transport was opened in.
    ///
    /// Archives are opened either for reading or for writing, never both.
    #[error("cannot {operation} in {mode} mode")]
    ModeConflict {
        /// The attempted operation.
        operation: &'static str,
        /// The mode the object was opened in.
        mode: &'static str,
    },

    /// An entry name does not fit in the 100-byte header name field.
    #[error("entry name '{name}' is too long ({len} bytes, limit is 99)")]
    NameTooLong {
        /// The (stripped) name that was rejected.
        name: String,
        /// Its length in bytes.
        len: usize,
    },

    /// An entry size cannot be represented in the header size field.
    #[error("entry size {size} exceeds the encodable maximum of {max}")]
    SizeTooLarge {
        /// The requested size.
        size: u64,
        /// The largest size the codec will encode.
        max: u64,
    },

    /// The transport moved fewer bytes than requested without reaching a
    /// legitimate end of stream.
    #[error("short {context}: expected {expected} bytes, transferred {actual}")]
    ShortIo {
        /// What was being transferred (e.g. "header write").
        context: &'static str,
        /// Bytes requested.
        expected: usize,
        /// Bytes actually transferred.
        actual: usize,
    },

    /// The API was used in a way the entry's state does not allow.
    ///
    /// Examples: erasing a streamed entry, renaming a read entry, reading
    /// from an entry opened for write.
    #[error("invalid operation '{operation}': {reason}")]
    InvalidOperation {
        /// The attempted operation.
        operation: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No entry with the given name exists in the archive directory.
    #[error("entry not found: {name}")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A header record failed checksum verification.
    #[error("corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// Byte offset of the header block in the (uncompressed) stream.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// A feature required by the call was not compiled into this build.
    #[error("unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the missing feature.
        feature: &'static str,
    },
}

impl Error {
    /// Returns `true` if this error was caused by calling the API incorrectly
    /// rather than by the archive data or the storage.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::ModeConflict { .. } | Error::InvalidOperation { .. }
        )
    }

    /// Returns `true` if this error indicates damaged archive data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptHeader { .. })
    }

    /// Returns `true` if the transport moved fewer bytes than requested.
    pub fn is_short_io(&self) -> bool {
        matches!(self, Error::ShortIo { .. })
    }

    /// Returns the entry name associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::NameTooLong { name, .. } => Some(name.as_str()),
            Error::NotFound { name } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Creates a ModeConflict error.
    pub fn mode_conflict(operation: &'static str, mode: &'static str) -> Self {
        Error::ModeConflict { operation, mode }
    }

    /// Creates an InvalidOperation error.
    pub fn invalid_operation(operation: &'static str, reason: &'static str) -> Self {
        Error::InvalidOperation { operation, reason }
    }

    /// Creates a ShortIo error.
    pub fn short_io(context: &'static str, expected: usize, actual: usize) -> Self {
        Error::ShortIo {
            context,
            expected,
            actual,
        }
    }

    /// Creates a NotFound error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::OpenFailure { source, .. } => source,
            Error::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, err),
            Error::ShortIo { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            Error::CorruptHeader { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::NameTooLong { .. } | Error::SizeTooLarge { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            Error::UnsupportedFeature { .. } => io::Error::new(io::ErrorKind::Unsupported, err),
            _ => io::Error::other(err),
        }
    }
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
