#![forbid(unsafe_code)]
//! Split tar archives into size-bounded pieces on entry boundaries.
//!
//! This library reads a tar stream (optionally gzip-compressed) and writes
//! its entries into a sequence of independent tar archives, each holding at
//! most a configured number of bytes. No entry is ever cut in half: every
//! output archive is a complete, valid tar file that can be extracted on its
//! own.
//!
//! # Overview
//!
//! The pipeline is a single streaming pass:
//!
//! ```text
//! input ─▶ gzip decode ─▶ tar entries ─▶ TarSplitter ─▶ TarWriter ─▶ SplitSink ─▶ gzip encode ─▶ file
//!          (optional)                    (rollover)                 (counting)    (optional)
//! ```
//!
//! - [`SplitSink`] wraps one output file, counts the bytes handed to it before
//!   compression, and can delete the file again.
//! - [`TarWriter`] re-emits header blocks verbatim, copies content, pads to
//!   512-byte blocks, and removes its file if anything goes wrong.
//! - [`TarSplitter`] decides, entry by entry, whether the current archive has
//!   room or a new one must be started.
//!
//! # Key Features
//!
//! - **Entry boundaries**: an entry and its header always land in the same archive
//! - **Verbatim metadata**: header blocks are copied byte-for-byte
//! - **Extension aware**: GNU long names and PAX headers stay with their entry
//! - **Compression-independent budgets**: sizes are measured in tar bytes
//! - **No partial output**: failed archives are removed before an error is returned
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use tarsplitter::{SplitConfig, TarSplitter, base_name, is_gzip_file};
//!
//! let input = "nightly.tar.gz";
//! let gzip = is_gzip_file(input)?;
//!
//! let config = SplitConfig::from_mib(512).with_gzip(gzip);
//! let splitter = TarSplitter::new("/srv/parts", base_name(input), config)?;
//! let stats = splitter.split(File::open(input)?)?;
//!
//! // nightly_000000.tar.gz, nightly_000001.tar.gz, ...
//! println!("wrote {} archives", stats.files.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Command-Line Tool
//!
//! The crate also builds a `tarsplitter` binary:
//! ```bash
//! # Split into 100 MiB pieces
//! tarsplitter split backup.tar.gz /srv/parts --split-size 100
//! ```

// Configuration and errors
pub mod config;
pub mod error;

// Input handling and naming
pub mod input;
pub mod naming;
mod tar_reader;

// Output
mod buffer_pool;
pub mod sink;
pub mod tar_writer;

// Splitting
pub mod splitter;

pub use config::{DEFAULT_GZIP_LEVEL, DEFAULT_SPLIT_SIZE_MIB, MIB, SplitConfig};
pub use error::{Result, SplitError};
pub use input::{GZIP_MAGIC, create_dest_dir, is_gzip_file};
pub use naming::{base_name, split_file_name};
pub use sink::SplitSink;
pub use splitter::{SplitFile, SplitStats, TarSplitter};
pub use tar_writer::{BLOCK_SIZE, HEADER_BLOCK_SIZE, TarWriter, tar_padding};
