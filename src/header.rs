//! Fixed-size header records and their binary codec.
//!
//! Every entry in an archive is preceded by one 512-byte header block. The
//! layout follows the classic GNU tar header:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 100 | name (NUL-terminated) |
//! | 100 | 8 | mode |
//! | 108 | 8 | uid |
//! | 116 | 8 | gid |
//! | 124 | 12 | size (ASCII octal, or base-256 when the top bit is set) |
//! | 136 | 12 | mtime |
//! | 148 | 8 | checksum (6-digit octal, NUL, space) |
//! | 156 | 1 | type flag |
//! | 257 | 8 | magic and version (`"ustar  \0"`) |
//! | 265 | 32 | owner name |
//! | 297 | 32 | group name |
//! | 329 | 8 | device major |
//! | 337 | 8 | device minor |
//! | 345 | 12 | access time |
//! | 357 | 12 | create time |
//! | 369 | 12 | offset |
//! | 483 | 12 | real size |
//!
//! Permission, ownership and time fields carry fixed placeholder values.

use crate::{Error, Result};

/// Size of a header block and the payload alignment unit.
pub const BLOCK_SIZE: usize = 512;

/// Width of the name field. Names must be strictly shorter than this.
pub const NAME_FIELD_LEN: usize = 100;

/// Largest size representable as 11 ASCII octal digits (8 GiB - 1).
pub const MAX_OCTAL_SIZE: u64 = 0o777_7777_7777;

/// Largest size representable in the 12-byte base-256 form (95 usable bits,
/// capped to `u64`).
pub const MAX_BASE256_SIZE: u64 = u64::MAX;

mod offsets {
    pub const NAME: usize = 0;
    pub const MODE: usize = 100;
    pub const UID: usize = 108;
    pub const GID: usize = 116;
    pub const SIZE: usize = 124;
    pub const SIZE_LEN: usize = 12;
    pub const MTIME: usize = 136;
    pub const CHECKSUM: usize = 148;
    pub const CHECKSUM_LEN: usize = 8;
    pub const TYPE_FLAG: usize = 156;
    pub const MAGIC: usize = 257;
    pub const OWNER_NAME: usize = 265;
    pub const GROUP_NAME: usize = 297;
    pub const DEV_MAJOR: usize = 329;
    pub const DEV_MINOR: usize = 337;
    pub const ATIME: usize = 345;
    pub const CTIME: usize = 357;
}

const PLACEHOLDER_MODE: &[u8] = b"0000644\0";
const PLACEHOLDER_ID: &[u8] = b"0000000\0";
const PLACEHOLDER_TIME: &[u8] = b"00000000000\0";
const PLACEHOLDER_OWNER: &[u8] = b"root";
const REGULAR_FILE: u8 = b'0';
/// GNU magic (`"ustar "`) followed by its version (`" \0"`).
const GNU_MAGIC: &[u8; 8] = b"ustar  \0";

/// Metadata for one archive entry.
///
/// `offset` is the position of the first payload byte in the uncompressed
/// stream; it is not stored in the block itself but recorded by the archive
/// when the header is written or scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Entry name, already stripped of any directory components.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Absolute offset of the payload in the archive stream.
    pub offset: u64,
}

impl HeaderRecord {
    /// Creates a record for `name`, validating that it fits the name field.
    pub fn new(name: &str, size: u64) -> Result<Self> {
        let name = strip_name(name)?;
        Ok(Self {
            name,
            size,
            offset: 0,
        })
    }

    /// Number of payload bytes including padding to the next block boundary.
    pub fn padded_size(&self) -> u64 {
        round_up_block(self.size)
    }
}

/// Result of decoding one 512-byte block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedBlock {
    /// A regular header record.
    Record(HeaderRecord),
    /// A terminal zero block, or anything that cannot be a header.
    EndOfDirectory,
}

/// Encoder/decoder for header blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderCodec {
    allow_base256: bool,
}

impl HeaderCodec {
    /// Creates a codec that only emits ASCII-octal sizes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables base-256 encoding of sizes above [`MAX_OCTAL_SIZE`].
    pub fn with_base256(mut self, enabled: bool) -> Self {
        self.allow_base256 = enabled;
        self
    }

    /// Largest size this codec will encode.
    pub fn max_size(&self) -> u64 {
        if self.allow_base256 {
            MAX_BASE256_SIZE
        } else {
            MAX_OCTAL_SIZE
        }
    }

    /// Encodes a header record into a 512-byte block.
    ///
    /// # Errors
    ///
    /// - [`Error::NameTooLong`] if the name does not fit the name field
    /// - [`Error::SizeTooLarge`] if the size exceeds [`max_size`](Self::max_size)
    pub fn encode(&self, record: &HeaderRecord) -> Result<[u8; BLOCK_SIZE]> {
        let name = record.name.as_bytes();
        if name.len() >= NAME_FIELD_LEN {
            return Err(Error::NameTooLong {
                name: record.name.clone(),
                len: name.len(),
            });
        }
        if record.size > self.max_size() {
            return Err(Error::SizeTooLarge {
                size: record.size,
                max: self.max_size(),
            });
        }

        let mut block = [0u8; BLOCK_SIZE];
        put(&mut block, offsets::NAME, name);
        put(&mut block, offsets::MODE, PLACEHOLDER_MODE);
        put(&mut block, offsets::UID, PLACEHOLDER_ID);
        put(&mut block, offsets::GID, PLACEHOLDER_ID);
        let size_field = &mut block[offsets::SIZE..offsets::SIZE + offsets::SIZE_LEN];
        if record.size > MAX_OCTAL_SIZE {
            write_base256(size_field, record.size);
        } else {
            write_octal(size_field, record.size);
        }
        put(&mut block, offsets::MTIME, PLACEHOLDER_TIME);
        block[offsets::TYPE_FLAG] = REGULAR_FILE;
        put(&mut block, offsets::MAGIC, GNU_MAGIC);
        put(&mut block, offsets::OWNER_NAME, PLACEHOLDER_OWNER);
        put(&mut block, offsets::GROUP_NAME, PLACEHOLDER_OWNER);
        put(&mut block, offsets::DEV_MAJOR, PLACEHOLDER_ID);
        put(&mut block, offsets::DEV_MINOR, PLACEHOLDER_ID);
        put(&mut block, offsets::ATIME, PLACEHOLDER_TIME);
        put(&mut block, offsets::CTIME, PLACEHOLDER_TIME);

        let sum = checksum(&block);
        let field = &mut block[offsets::CHECKSUM..offsets::CHECKSUM + offsets::CHECKSUM_LEN];
        write_octal(&mut field[..7], u64::from(sum));
        field[7] = b' ';

        Ok(block)
    }

    /// Decodes a header block.
    ///
    /// Anything that is not exactly [`BLOCK_SIZE`] bytes, or whose size field
    /// cannot be parsed, decodes as [`DecodedBlock::EndOfDirectory`]. This is
    /// how the trailing zero blocks are recognized.
    pub fn decode(&self, block: &[u8]) -> DecodedBlock {
        if block.len() != BLOCK_SIZE {
            return DecodedBlock::EndOfDirectory;
        }
        let Some(size) = parse_size(&block[offsets::SIZE..offsets::SIZE + offsets::SIZE_LEN])
        else {
            return DecodedBlock::EndOfDirectory;
        };

        let raw_name = &block[offsets::NAME..offsets::NAME + NAME_FIELD_LEN];
        let name_len = raw_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        let name = String::from_utf8_lossy(&raw_name[..name_len]).into_owned();

        DecodedBlock::Record(HeaderRecord {
            name,
            size,
            offset: 0,
        })
    }
}

/// Computes the header checksum: the unsigned byte sum of the block with
/// the checksum field treated as eight spaces.
pub fn checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    let field = offsets::CHECKSUM..offsets::CHECKSUM + offsets::CHECKSUM_LEN;
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if field.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(b)
            }
        })
        .sum()
}

/// Returns `true` if the stored checksum matches the block contents.
pub fn verify(block: &[u8; BLOCK_SIZE]) -> bool {
    let field = &block[offsets::CHECKSUM..offsets::CHECKSUM + offsets::CHECKSUM_LEN];
    match parse_octal(field) {
        Some(stored) => stored == u64::from(checksum(block)),
        None => false,
    }
}

/// Reduces a path to its final component and checks it fits the name field.
///
/// Both `/` and `\` are treated as separators.
pub fn strip_name(name: &str) -> Result<String> {
    let base = base_name(name);
    if base.is_empty() {
        return Err(Error::invalid_operation(
            "entry_open",
            "name has no file component",
        ));
    }
    if base.len() >= NAME_FIELD_LEN {
        return Err(Error::NameTooLong {
            name: base.to_string(),
            len: base.len(),
        });
    }
    Ok(base.to_string())
}

/// Returns the final component of `name` without validating it.
pub fn base_name(name: &str) -> &str {
    match name.rfind(['/', '\\']) {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Rounds `n` up to a multiple of [`BLOCK_SIZE`].
pub fn round_up_block(n: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    n.div_ceil(block).saturating_mul(block)
}

fn put(block: &mut [u8; BLOCK_SIZE], at: usize, bytes: &[u8]) {
    block[at..at + bytes.len()].copy_from_slice(bytes);
}

/// Writes `value` as zero-padded octal filling all but the last byte of
/// `field`, which is left as NUL.
fn write_octal(field: &mut [u8], value: u64) {
    let digits = field.len() - 1;
    let mut v = value;
    for slot in field[..digits].iter_mut().rev() {
        *slot = b'0' + (v & 7) as u8;
        v >>= 3;
    }
    field[digits] = 0;
}

fn write_base256(field: &mut [u8], value: u64) {
    field.fill(0);
    let bytes = value.to_be_bytes();
    let start = field.len() - bytes.len();
    field[start..].copy_from_slice(&bytes);
    field[0] |= 0x80;
}

fn parse_size(field: &[u8]) -> Option<u64> {
    if field[0] & 0x80 != 0 {
        parse_base256(field)
    } else {
        parse_octal(field)
    }
}

/// Parses ASCII octal, skipping leading spaces and stopping at the first
/// NUL or space. A field with no digits does not parse.
fn parse_octal(field: &[u8]) -> Option<u64> {
    let mut digits = field
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|&&b| b != 0 && b != b' ')
        .peekable();
    digits.peek()?;

    let mut value: u64 = 0;
    for &b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        value = value.checked_mul(8)?.checked_add(u64::from(b - b'0'))?;
    }
    Some(value)
}

/// Parses a big-endian base-256 number with the marker bit masked off.
fn parse_base256(field: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    for (i, &b) in field.iter().enumerate() {
        let b = if i == 0 { b & 0x7f } else { b };
        value = value.checked_mul(256)?.checked_add(u64::from(b))?;
    }
    Some(value)
}
