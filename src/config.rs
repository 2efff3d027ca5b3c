//! Configuration for archive buffering and header encoding.
//!
//! This module provides [`ArchiveConfig`] for controlling how entries buffer
//! their data, how the transport compresses, and how strictly headers are
//! checked.

use crate::header::HeaderCodec;
use crate::{Error, Result};

/// Configuration for an [`Archive`](crate::Archive).
///
/// # Example
///
/// ```rust
/// use tarlite::ArchiveConfig;
///
/// // Default configuration (32 KiB stream buffer, level 6, no verification)
/// let config = ArchiveConfig::default();
///
/// // Stricter reading and a smaller streaming buffer
/// let config = ArchiveConfig::new()
///     .stream_buffer_size(8 * 1024)
///     .verify_checksums(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Size of the fixed working buffer of a STREAMED entry (bytes).
    ///
    /// The buffer is flushed to the transport whenever it fills.
    /// Default: 32 KiB.
    pub stream_buffer_size: usize,

    /// First size class of a BUFFERED entry (bytes).
    ///
    /// Default: 4 KiB.
    pub small_buffer: usize,

    /// Second size class of a BUFFERED entry (bytes).
    ///
    /// Default: 256 KiB.
    pub medium_buffer: usize,

    /// Growth step once a BUFFERED entry outgrows the medium class (bytes).
    ///
    /// Default: 1 MiB.
    pub large_step: usize,

    /// Gzip level used when writing a compressed archive (0-9).
    ///
    /// Default: 6.
    pub compression_level: u32,

    /// Re-verify each header checksum while scanning a read-mode archive.
    ///
    /// Default: false.
    pub verify_checksums: bool,

    /// Encode sizes above the octal ceiling (8 GiB - 1) in base-256.
    ///
    /// When disabled such sizes are rejected with
    /// [`Error::SizeTooLarge`]. Base-256 sizes are always accepted on read.
    /// Default: false.
    pub allow_base256_sizes: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            stream_buffer_size: 32 * 1024, // 32 KiB
            small_buffer: 4 * 1024,        // 4 KiB
            medium_buffer: 256 * 1024,     // 256 KiB
            large_step: 1024 * 1024,       // 1 MiB
            compression_level: 6,
            verify_checksums: false,
            allow_base256_sizes: false,
        }
    }
}

impl ArchiveConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the STREAMED working buffer size.
    pub fn stream_buffer_size(mut self, size: usize) -> Self {
        self.stream_buffer_size = size;
        self
    }

    /// Sets the BUFFERED size classes.
    pub fn buffer_classes(mut self, small: usize, medium: usize, large_step: usize) -> Self {
        self.small_buffer = small;
        self.medium_buffer = medium;
        self.large_step = large_step;
        self
    }

    /// Sets the gzip compression level.
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Enables or disables checksum verification on read.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Enables or disables base-256 size encoding on write.
    pub fn allow_base256_sizes(mut self, allow: bool) -> Self {
        self.allow_base256_sizes = allow;
        self
    }

    /// Checks the configuration for values the archive cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.stream_buffer_size == 0 {
            return Err(Error::invalid_operation(
                "configure",
                "stream buffer size must be non-zero",
            ));
        }
        if self.small_buffer == 0 || self.large_step == 0 {
            return Err(Error::invalid_operation(
                "configure",
                "buffer size classes must be non-zero",
            ));
        }
        if self.small_buffer > self.medium_buffer {
            return Err(Error::invalid_operation(
                "configure",
                "small buffer class must not exceed the medium class",
            ));
        }
        if self.compression_level > 9 {
            return Err(Error::invalid_operation(
                "configure",
                "compression level must be 0-9",
            ));
        }
        Ok(())
    }

    /// Returns the header codec matching this configuration.
    pub(crate) fn codec(&self) -> HeaderCodec {
        HeaderCodec::new().with_base256(self.allow_base256_sizes)
    }

    /// Returns the capacity a BUFFERED entry should grow to so that it can
    /// hold `required` bytes.
    pub(crate) fn buffer_capacity_for(&self, required: usize) -> usize {
        if required <= self.small_buffer {
            self.small_buffer
        } else if required <= self.medium_buffer {
            self.medium_buffer
        } else {
            required.div_ceil(self.large_step) * self.large_step
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ArchiveConfig::default();
        assert_eq!(config.stream_buffer_size, 32 * 1024);
        assert_eq!(config.compression_level, 6);
        assert!(!config.verify_checksums);
        assert!(!config.allow_base256_sizes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ArchiveConfig::new()
            .stream_buffer_size(1024)
            .buffer_classes(16, 64, 128)
            .compression_level(9)
            .verify_checksums(true)
            .allow_base256_sizes(true);
        assert_eq!(config.stream_buffer_size, 1024);
        assert_eq!(config.small_buffer, 16);
        assert_eq!(config.medium_buffer, 64);
        assert_eq!(config.large_step, 128);
        assert_eq!(config.compression_level, 9);
        assert!(config.verify_checksums);
        assert!(config.allow_base256_sizes);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ArchiveConfig::new().stream_buffer_size(0).validate().is_err());
        assert!(ArchiveConfig::new().buffer_classes(0, 64, 128).validate().is_err());
        assert!(ArchiveConfig::new().buffer_classes(128, 64, 128).validate().is_err());
        assert!(ArchiveConfig::new().compression_level(10).validate().is_err());
    }

    #[test]
    fn test_buffer_size_classes() {
        let config = ArchiveConfig::new().buffer_classes(16, 64, 100);
        assert_eq!(config.buffer_capacity_for(1), 16);
        assert_eq!(config.buffer_capacity_for(16), 16);
        assert_eq!(config.buffer_capacity_for(17), 64);
        assert_eq!(config.buffer_capacity_for(64), 64);
        assert_eq!(config.buffer_capacity_for(65), 100);
        assert_eq!(config.buffer_capacity_for(250), 300);
    }
}
