//! Tar archive writing for split archives.
//!
//! [`TarWriter`] re-emits tar entries read from the input into one split
//! archive. Header blocks are copied byte-for-byte, so every field the input
//! carried (including vendor extensions) survives the split unchanged.
//!
//! # TAR Format
//!
//! TAR archives consist of:
//! - 512-byte header blocks
//! - File content padded to 512-byte boundaries
//! - End-of-archive marker (1024 zero bytes)
//!
//! The padding after an entry's content is written lazily, right before the
//! next header or the footer. At the moment a caller asks
//! [`written`](TarWriter::written) the count therefore covers all headers and
//! content, plus the padding of every entry except the most recent one.
//!
//! # Failure
//!
//! Once any write fails the writer is marked failed. Closing a failed writer
//! skips the footer and removes the file, so a half-written archive never
//! stays behind.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Result, SplitError};
use crate::sink::SplitSink;

/// Size of a tar block, and of every header.
pub const BLOCK_SIZE: u64 = 512;

/// Size of the header block preceding each entry's content.
pub const HEADER_BLOCK_SIZE: u64 = BLOCK_SIZE;

const ZERO_BLOCK: [u8; BLOCK_SIZE as usize] = [0u8; BLOCK_SIZE as usize];

/// Number of zero bytes needed after `size` content bytes to reach a block boundary.
pub fn tar_padding(size: u64) -> u64 {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

/// Writer for one split archive.
#[derive(Debug)]
pub struct TarWriter<W: Write = BufWriter<File>> {
    sink: SplitSink<W>,

    /// Zero bytes owed after the last entry's content.
    pending_padding: u64,

    /// Content size declared by the current entry's header.
    declared: u64,

    /// Content bytes the current entry still expects.
    remaining: u64,

    /// Name of the current entry, for error messages.
    current: String,

    /// Set once any write has failed.
    failed: bool,
}

impl<W: Write> TarWriter<W> {
    /// Wrap a sink. Nothing is written until the first header.
    pub fn new(sink: SplitSink<W>) -> Self {
        Self {
            sink,
            pending_padding: 0,
            declared: 0,
            remaining: 0,
            current: String::new(),
            failed: false,
        }
    }

    /// Bytes written to the sink so far, before compression.
    pub fn written(&self) -> u64 {
        self.sink.written()
    }

    /// Path of the archive being written.
    pub fn path(&self) -> &Path {
        self.sink.path()
    }

    /// Write an entry's header block, declaring `size` content bytes.
    ///
    /// `size` is usually the header's own size field, but a PAX `size`
    /// record preceding the entry takes precedence over it. The previous
    /// entry must have received all of its declared content.
    pub fn write_header(&mut self, header: &tar::Header, size: u64) -> Result<()> {
        if let Err(e) = self.check_complete() {
            self.failed = true;
            return Err(e);
        }

        let result = self
            .write_padding()
            .and_then(|()| self.sink.write_all(header.as_bytes()));
        if let Err(source) = result {
            self.failed = true;
            return Err(SplitError::WriteHeader {
                path: self.sink.path().to_path_buf(),
                source,
            });
        }

        self.current = String::from_utf8_lossy(&header.path_bytes()).into_owned();
        self.declared = size;
        self.remaining = size;
        self.pending_padding = tar_padding(size);
        Ok(())
    }

    /// Copy the current entry's content from `src`.
    ///
    /// Reads exactly as many bytes as the header declared, using `buf` for
    /// the transfer. Running out of input early is a decode error; failing to
    /// write is a write error. Returns the number of bytes copied.
    pub fn copy_payload<R: Read + ?Sized>(&mut self, src: &mut R, buf: &mut [u8]) -> Result<u64> {
        let mut copied = 0;
        while self.remaining > 0 {
            let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
            let n = match src.read(&mut buf[..want]) {
                Ok(0) => {
                    self.failed = true;
                    return Err(SplitError::Decode(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "unexpected end of input in {}, {} bytes missing",
                            self.current, self.remaining
                        ),
                    )));
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.failed = true;
                    return Err(SplitError::Decode(e));
                }
            };

            if let Err(source) = self.write_all(&buf[..n]) {
                return Err(SplitError::WritePayload {
                    path: self.sink.path().to_path_buf(),
                    source,
                });
            }
            copied += n as u64;
        }
        Ok(copied)
    }

    /// Finish the archive and close the file.
    ///
    /// On a healthy writer this writes the last padding and the end-of-archive
    /// footer, then closes the sink. If either step fails, or if the writer had
    /// already failed, the file is deleted and every error is returned joined.
    /// Cleanup of an already failed writer returns `Ok` when the file was
    /// removed cleanly; the caller holds the original error.
    pub fn close(mut self) -> Result<()> {
        let mut errors = Vec::new();
        if !self.failed
            && let Err(e) = self.finish()
        {
            errors.push(e);
        }
        if let Err(e) = self.sink.close() {
            errors.push(e);
        }

        if self.failed || !errors.is_empty() {
            tracing::debug!("removing failed split {}", self.sink.path().display());
            if let Err(e) = self.sink.delete() {
                errors.push(e);
            }
        }

        match SplitError::join(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Abandon the archive: close it and remove the file.
    ///
    /// Returns `Ok` when the file was removed cleanly.
    pub fn discard(mut self) -> Result<()> {
        self.failed = true;
        self.close()
    }

    fn finish(&mut self) -> Result<()> {
        self.check_complete()?;
        self.write_padding()
            .and_then(|()| self.sink.write_all(&ZERO_BLOCK))
            .and_then(|()| self.sink.write_all(&ZERO_BLOCK))
            .map_err(|source| SplitError::FinishArchive {
                path: self.sink.path().to_path_buf(),
                source,
            })
    }

    fn check_complete(&self) -> Result<()> {
        if self.remaining > 0 {
            return Err(SplitError::SizeMismatch {
                name: self.current.clone(),
                expected: self.declared,
                actual: self.declared - self.remaining,
            });
        }
        Ok(())
    }

    fn write_padding(&mut self) -> io::Result<()> {
        let padding = self.pending_padding as usize;
        if padding > 0 {
            self.sink.write_all(&ZERO_BLOCK[..padding])?;
            self.pending_padding = 0;
        }
        Ok(())
    }
}

impl<W: Write> Write for TarWriter<W> {
    /// Write content of the current entry.
    ///
    /// Writing past the size declared by the header is refused.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() as u64 > self.remaining {
            self.failed = true;
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} bytes exceed the {} remaining for {}",
                    buf.len(),
                    self.remaining,
                    self.current
                ),
            ));
        }
        match self.sink.write(buf) {
            Ok(n) => {
                self.remaining -= n as u64;
                Ok(n)
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
