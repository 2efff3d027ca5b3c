//! Linear byte-stream I/O over plain or gzip-compressed storage.
//!
//! [`Transport`] hides whether the archive file is compressed: offsets are
//! always positions in the uncompressed stream. A transport is opened either
//! for reading or for writing, never both.
//!
//! Compressed streams cannot seek natively. Forward seeks are emulated (by
//! skipping on read and by writing zeros on write). A backward seek on a
//! compressed read stream closes and reopens the file, then skips forward;
//! the decoder state is never rewound in place.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "gzip")]
use flate2::{Compression as GzLevel, read::MultiGzDecoder, write::GzEncoder};

use crate::{Error, Result};

/// Leading bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Storage compression of an archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Detect gzip from the file's magic bytes (read mode only).
    #[default]
    Auto,
    /// Uncompressed storage.
    Plain,
    /// The whole stream is wrapped in gzip.
    Gzip,
}

/// Direction a transport was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Read-only.
    Read,
    /// Write-only.
    Write,
}

impl TransportMode {
    fn as_str(self) -> &'static str {
        match self {
            TransportMode::Read => "read",
            TransportMode::Write => "write",
        }
    }
}

enum Channel {
    PlainRead(BufReader<File>),
    PlainWrite(BufWriter<File>),
    #[cfg(feature = "gzip")]
    GzipRead(MultiGzDecoder<BufReader<File>>),
    #[cfg(feature = "gzip")]
    GzipWrite(GzEncoder<BufWriter<File>>),
}

/// A linear read or write stream over an archive file.
pub struct Transport {
    path: PathBuf,
    channel: Option<Channel>,
    mode: TransportMode,
    compressed: bool,
    position: u64,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("compressed", &self.compressed)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| Error::OpenFailure {
        path: path.to_path_buf(),
        source,
    })
}

fn is_gzip_file(path: &Path) -> Result<bool> {
    let mut file = open_file(path)?;
    let mut magic = [0u8; 2];
    let n = fill(&mut file, &mut magic)?;
    Ok(n == magic.len() && magic == GZIP_MAGIC)
}

/// Reads until `buf` is full or the stream ends.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(feature = "gzip")]
fn gzip_reader(reader: BufReader<File>) -> Result<Channel> {
    Ok(Channel::GzipRead(MultiGzDecoder::new(reader)))
}

#[cfg(feature = "gzip")]
fn gzip_writer(writer: BufWriter<File>, level: u32) -> Result<Channel> {
    Ok(Channel::GzipWrite(GzEncoder::new(
        writer,
        GzLevel::new(level.min(9)),
    )))
}

#[cfg(not(feature = "gzip"))]
fn gzip_reader(_reader: BufReader<File>) -> Result<Channel> {
    Err(Error::UnsupportedFeature { feature: "gzip" })
}

#[cfg(not(feature = "gzip"))]
fn gzip_writer(_writer: BufWriter<File>, _level: u32) -> Result<Channel> {
    Err(Error::UnsupportedFeature { feature: "gzip" })
}

impl Transport {
    /// Opens `path` for reading.
    ///
    /// With [`Compression::Auto`] the file is probed for the gzip magic and
    /// read as plain storage otherwise.
    pub fn open_read(path: impl AsRef<Path>, compression: Compression) -> Result<Self> {
        let path = path.as_ref();
        let compressed = match compression {
            Compression::Auto => is_gzip_file(path)?,
            Compression::Plain => false,
            Compression::Gzip => true,
        };
        let channel = Self::read_channel(path, compressed)?;
        log::debug!(
            "opened '{}' for reading ({})",
            path.display(),
            if compressed { "gzip" } else { "plain" }
        );
        Ok(Self {
            path: path.to_path_buf(),
            channel: Some(channel),
            mode: TransportMode::Read,
            compressed,
            position: 0,
        })
    }

    /// Creates (or truncates) `path` for writing.
    ///
    /// `level` is the gzip level and is ignored for plain storage.
    pub fn create(path: impl AsRef<Path>, compression: Compression, level: u32) -> Result<Self> {
        let path = path.as_ref();
        let compressed = match compression {
            Compression::Plain => false,
            Compression::Gzip => true,
            Compression::Auto => {
                return Err(Error::mode_conflict("auto-detect compression", "write"));
            }
        };
        let file = File::create(path).map_err(|source| Error::OpenFailure {
            path: path.to_path_buf(),
            source,
        })?;
        let writer = BufWriter::new(file);
        let channel = if compressed {
            gzip_writer(writer, level)?
        } else {
            Channel::PlainWrite(writer)
        };
        log::debug!(
            "created '{}' for writing ({})",
            path.display(),
            if compressed { "gzip" } else { "plain" }
        );
        Ok(Self {
            path: path.to_path_buf(),
            channel: Some(channel),
            mode: TransportMode::Write,
            compressed,
            position: 0,
        })
    }

    fn read_channel(path: &Path, compressed: bool) -> Result<Channel> {
        let reader = BufReader::new(open_file(path)?);
        if compressed {
            gzip_reader(reader)
        } else {
            Ok(Channel::PlainRead(reader))
        }
    }

    /// Returns the path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the direction this transport was opened in.
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Returns `true` if the stream is gzip-wrapped.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Current position in the uncompressed stream.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn closed() -> Error {
        Error::invalid_operation("transfer", "transport is closed")
    }

    /// Writes `buf` at the current position.
    ///
    /// Returns the number of bytes accepted, which is less than `buf.len()`
    /// only if the storage stopped accepting data part-way. An error is
    /// returned only when nothing at all could be written.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mode = self.mode;
        let writer: &mut dyn Write = match self.channel.as_mut().ok_or_else(Self::closed)? {
            Channel::PlainWrite(w) => w,
            #[cfg(feature = "gzip")]
            Channel::GzipWrite(w) => w,
            _ => return Err(Error::mode_conflict("write", mode.as_str())),
        };

        let mut written = 0;
        while written < buf.len() {
            match writer.write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if written == 0 => return Err(e.into()),
                Err(e) => {
                    log::debug!("write stopped after {} bytes: {}", written, e);
                    break;
                }
            }
        }
        self.position += written as u64;
        log::trace!("wrote {} bytes, now at {}", written, self.position);
        Ok(written)
    }

    /// Reads into `buf` from the current position until it is full or the
    /// stream ends. Returns the number of bytes read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mode = self.mode;
        let reader: &mut dyn Read = match self.channel.as_mut().ok_or_else(Self::closed)? {
            Channel::PlainRead(r) => r,
            #[cfg(feature = "gzip")]
            Channel::GzipRead(r) => r,
            _ => return Err(Error::mode_conflict("read", mode.as_str())),
        };
        let n = fill(reader, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    /// Reads into `buf` starting at absolute stream offset `offset`.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if self.mode != TransportMode::Read {
            return Err(Error::mode_conflict("read", self.mode.as_str()));
        }
        if self.seek(SeekFrom::Start(offset))? != offset {
            // The target lies beyond the end of a compressed stream.
            return Ok(0);
        }
        self.read(buf)
    }

    /// Moves the stream position and returns the new absolute position.
    ///
    /// Seeking to the current position is a no-op. On a compressed read
    /// stream, seeking past the end stops at the end; the returned position
    /// tells the caller how far it got.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta).ok_or_else(|| {
                Error::invalid_operation("seek", "position would be negative or overflow")
            })?,
            SeekFrom::End(_) => return self.seek_end(pos),
        };
        if target == self.position {
            return Ok(self.position);
        }

        match self.channel.as_mut().ok_or_else(Self::closed)? {
            Channel::PlainRead(r) => {
                self.position = r.seek(SeekFrom::Start(target))?;
            }
            Channel::PlainWrite(w) => {
                self.position = w.seek(SeekFrom::Start(target))?;
            }
            #[cfg(feature = "gzip")]
            Channel::GzipRead(_) => {
                if target < self.position {
                    log::debug!(
                        "reopening compressed stream '{}' to seek back to {}",
                        self.path.display(),
                        target
                    );
                    self.channel = Some(Self::read_channel(&self.path, true)?);
                    self.position = 0;
                }
                self.skip_forward(target - self.position)?;
            }
            #[cfg(feature = "gzip")]
            Channel::GzipWrite(_) => {
                if target < self.position {
                    return Err(Error::mode_conflict("seek backwards", "compressed write"));
                }
                self.zero_fill(target - self.position, "seek fill")?;
            }
        }
        Ok(self.position)
    }

    fn seek_end(&mut self, pos: SeekFrom) -> Result<u64> {
        match self.channel.as_mut().ok_or_else(Self::closed)? {
            Channel::PlainRead(r) => {
                self.position = r.seek(pos)?;
                Ok(self.position)
            }
            Channel::PlainWrite(w) => {
                self.position = w.seek(pos)?;
                Ok(self.position)
            }
            #[cfg(feature = "gzip")]
            _ => Err(Error::invalid_operation(
                "seek",
                "compressed streams have no known end",
            )),
        }
    }

    #[cfg(feature = "gzip")]
    fn skip_forward(&mut self, count: u64) -> Result<()> {
        if let Some(Channel::GzipRead(r)) = self.channel.as_mut() {
            let skipped = io::copy(&mut r.by_ref().take(count), &mut io::sink())?;
            self.position += skipped;
        }
        Ok(())
    }

    /// Writes `count` zero bytes. `context` names the operation in a
    /// [`Error::ShortIo`].
    pub(crate) fn zero_fill(&mut self, count: u64, context: &'static str) -> Result<()> {
        const ZEROS: [u8; 512] = [0u8; 512];
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(ZEROS.len() as u64) as usize;
            let n = self.write(&ZEROS[..chunk])?;
            if n < chunk {
                return Err(Error::short_io(context, chunk, n));
            }
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Flushes and closes the stream. Further transfers fail.
    ///
    /// For a compressed write stream this writes the gzip trailer.
    pub fn close(&mut self) -> Result<()> {
        match self.channel.take() {
            Some(Channel::PlainWrite(mut w)) => w.flush()?,
            #[cfg(feature = "gzip")]
            Some(Channel::GzipWrite(w)) => {
                let mut inner = w.finish()?;
                inner.flush()?;
            }
            _ => {}
        }
        Ok(())
    }
}
