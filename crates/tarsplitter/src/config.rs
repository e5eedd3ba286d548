//! Split configuration.
//!
//! [`SplitConfig`] carries the knobs the command line exposes: the byte
//! budget per output archive and whether input and output are gzip-compressed.
//!
//! # Usage Example
//!
//! ```
//! use tarsplitter::SplitConfig;
//!
//! // 250 MiB splits, reading and writing tar.gz
//! let config = SplitConfig::from_mib(250).with_gzip(true);
//! config.validate()?;
//!
//! assert_eq!(config.max_bytes_per_split, 250 * 1024 * 1024);
//! assert!(config.gzip_input && config.gzip_output);
//! # Ok::<(), tarsplitter::SplitError>(())
//! ```

use crate::error::{Result, SplitError};

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Default split size in mebibytes.
pub const DEFAULT_SPLIT_SIZE_MIB: u64 = 1000;

/// Default gzip level for compressed output.
pub const DEFAULT_GZIP_LEVEL: u32 = 6;

/// Configuration for a [`TarSplitter`](crate::TarSplitter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitConfig {
    /// Maximum header plus content bytes per output archive.
    ///
    /// Padding of the last entry, the end-of-archive footer and gzip framing
    /// are not counted. A single entry larger than this still gets written,
    /// alone, to its own archive.
    pub max_bytes_per_split: u64,

    /// Decode the input as gzip before reading tar entries.
    pub gzip_input: bool,

    /// Gzip-compress each output archive (`.tar.gz` instead of `.tar`).
    pub gzip_output: bool,

    /// Compression level (0-9) used when `gzip_output` is set.
    pub gzip_level: u32,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::from_mib(DEFAULT_SPLIT_SIZE_MIB)
    }
}

impl SplitConfig {
    /// Create a configuration with a budget in bytes and no compression.
    pub fn new(max_bytes_per_split: u64) -> Self {
        Self {
            max_bytes_per_split,
            gzip_input: false,
            gzip_output: false,
            gzip_level: DEFAULT_GZIP_LEVEL,
        }
    }

    /// Create a configuration with a budget in mebibytes.
    pub fn from_mib(mib: u64) -> Self {
        Self::new(mib.saturating_mul(MIB))
    }

    /// Set both input and output compression.
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip_input = gzip;
        self.gzip_output = gzip;
        self
    }

    /// Set input compression only.
    pub fn with_gzip_input(mut self, gzip: bool) -> Self {
        self.gzip_input = gzip;
        self
    }

    /// Set output compression only.
    pub fn with_gzip_output(mut self, gzip: bool) -> Self {
        self.gzip_output = gzip;
        self
    }

    /// Set the output compression level.
    pub fn with_gzip_level(mut self, level: u32) -> Self {
        self.gzip_level = level;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes_per_split == 0 {
            return Err(SplitError::InvalidConfig(
                "maximum bytes per split must be positive".to_string(),
            ));
        }
        if self.gzip_level > 9 {
            return Err(SplitError::InvalidConfig(format!(
                "gzip level must be between 0 and 9, got {}",
                self.gzip_level
            )));
        }
        Ok(())
    }

    pub(crate) fn compression(&self) -> flate2::Compression {
        flate2::Compression::new(self.gzip_level)
    }
}
