//! Byte-counting output for one split archive.
//!
//! A [`SplitSink`] owns the file behind a split archive. Writes optionally go
//! through a gzip encoder; [`written`](SplitSink::written) always reports the
//! bytes accepted from the caller, before compression, so split budgets are
//! measured in tar bytes regardless of how well the data compresses.
//!
//! The file is created and removed relative to a `cap_std::fs::Dir` handle
//! for the destination directory rather than by absolute path.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cap_std::fs::Dir;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{Result, SplitError};

/// Buffer size between the encoder (or tar writer) and the file.
const FILE_BUFFER_SIZE: usize = 256 * 1024;

enum Output<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

/// Output file of a single split archive.
pub struct SplitSink<W: Write = BufWriter<File>> {
    /// Destination directory holding the file.
    dir: Arc<Dir>,

    /// File name within `dir`.
    name: String,

    /// Full path, for messages and reporting.
    path: PathBuf,

    /// `None` once closed.
    output: Option<Output<W>>,

    /// Bytes accepted from callers.
    written: u64,
}

impl SplitSink {
    /// Create `name` in `dir`, truncating any existing file.
    ///
    /// `dir_path` is only used to build the reported path.
    pub fn create(
        dir: Arc<Dir>,
        dir_path: &Path,
        name: String,
        compression: Option<Compression>,
    ) -> Result<Self> {
        let path = dir_path.join(&name);
        let file = match dir.create(&name) {
            Ok(file) => file.into_std(),
            Err(source) => return Err(SplitError::CreateSplit { path, source }),
        };
        let writer = BufWriter::with_capacity(FILE_BUFFER_SIZE, file);
        Ok(SplitSink::with_writer(dir, path, name, writer, compression))
    }
}

impl<W: Write> SplitSink<W> {
    /// Build a sink over an already opened writer for the file `name` in `dir`.
    pub(crate) fn with_writer(
        dir: Arc<Dir>,
        path: PathBuf,
        name: String,
        writer: W,
        compression: Option<Compression>,
    ) -> Self {
        let output = match compression {
            Some(level) => Output::Gzip(GzEncoder::new(writer, level)),
            None => Output::Plain(writer),
        };
        Self {
            dir,
            name,
            path,
            output: Some(output),
            written: 0,
        }
    }

    /// Bytes accepted so far, before compression.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finish the gzip stream (if any), then flush the file.
    ///
    /// Both steps run even if the first fails; every failure is reported.
    /// Closing an already closed sink does nothing.
    pub fn close(&mut self) -> Result<()> {
        let Some(output) = self.output.take() else {
            return Ok(());
        };

        let mut errors = Vec::new();
        match output {
            Output::Plain(mut writer) => {
                if let Err(e) = writer.flush() {
                    errors.push(e);
                }
            }
            Output::Gzip(mut encoder) => {
                if let Err(e) = encoder.try_finish() {
                    errors.push(e);
                }
                if let Err(e) = encoder.get_mut().flush() {
                    errors.push(e);
                }
            }
        }

        match SplitError::join(errors.into_iter().map(|source| SplitError::CloseSink {
            path: self.path.clone(),
            source,
        })) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove the backing file.
    ///
    /// Only used to clean up after a failure; any still-open output is
    /// discarded without flushing.
    pub fn delete(&mut self) -> Result<()> {
        self.output = None;
        self.dir
            .remove_file(&self.name)
            .map_err(|source| SplitError::Delete {
                path: self.path.clone(),
                source,
            })
    }
}

impl<W: Write> Write for SplitSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.output.as_mut() {
            Some(Output::Plain(writer)) => writer.write(buf)?,
            Some(Output::Gzip(encoder)) => encoder.write(buf)?,
            None => return Err(closed_error()),
        };
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.output.as_mut() {
            Some(Output::Plain(writer)) => writer.flush(),
            Some(Output::Gzip(encoder)) => encoder.flush(),
            None => Err(closed_error()),
        }
    }
}

impl<W: Write> std::fmt::Debug for SplitSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitSink")
            .field("path", &self.path)
            .field("written", &self.written)
            .field("closed", &self.output.is_none())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::other("split sink is closed")
}
