//! Block-level tar reading.
//!
//! [`TarReader`] walks a tar stream header by header without interpreting
//! extension entries, so the splitter sees every header block exactly as it
//! was stored. The caller decides how many content bytes follow each header:
//! normally the header's size field, but a PAX `size` record overrides it
//! (see [`pax_size`]).
//!
//! The stream ends at the first all-zero block or at a clean EOF on a block
//! boundary.

use std::io::{self, Read};

use crate::error::{Result, SplitError};
use crate::tar_writer::{BLOCK_SIZE, tar_padding};

/// Byte range of the checksum field in a header block.
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// PAX record key carrying the entry's content size.
const PAX_SIZE_KEY: &[u8] = b"size";

/// Reads header blocks and entry content from a tar stream.
pub(crate) struct TarReader<R> {
    inner: R,

    /// Padding still to skip after the content handed out last.
    pending_padding: u64,
}

impl<R: Read> TarReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            pending_padding: 0,
        }
    }

    /// Read the next header block, or `None` at the end of the archive.
    ///
    /// The content of the previous entry must have been read in full.
    pub(crate) fn next_header(&mut self) -> Result<Option<tar::Header>> {
        self.skip_padding()?;

        let mut block = [0u8; BLOCK_SIZE as usize];
        let n = read_block(&mut self.inner, &mut block).map_err(SplitError::Decode)?;
        if n == 0 {
            return Ok(None);
        }
        if n < block.len() {
            return Err(SplitError::Decode(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("truncated tar header: {n} of {} bytes", block.len()),
            )));
        }
        if block.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let header = tar::Header::from_byte_slice(&block);
        verify_checksum(header)?;
        Ok(Some(header.clone()))
    }

    /// Reader over the next `size` content bytes.
    ///
    /// The padding after the content is skipped by the next
    /// [`next_header`](Self::next_header) call.
    pub(crate) fn content(&mut self, size: u64) -> io::Take<&mut R> {
        self.pending_padding = tar_padding(size);
        (&mut self.inner).take(size)
    }

    fn skip_padding(&mut self) -> Result<()> {
        let padding = std::mem::take(&mut self.pending_padding);
        if padding == 0 {
            return Ok(());
        }
        let skipped = io::copy(&mut (&mut self.inner).take(padding), &mut io::sink())
            .map_err(SplitError::Decode)?;
        if skipped != padding {
            return Err(SplitError::Decode(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unexpected end of input in entry padding",
            )));
        }
        Ok(())
    }
}

/// Fill `block` as far as the input allows; returns the bytes read.
fn read_block<R: Read>(reader: &mut R, block: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < block.len() {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Check the stored header checksum against the block contents.
///
/// The checksum is the byte sum of the block with the checksum field itself
/// read as spaces.
fn verify_checksum(header: &tar::Header) -> Result<()> {
    let stored = header.cksum().map_err(SplitError::Decode)?;
    let bytes = header.as_bytes();
    let computed: u32 = bytes[..CHECKSUM_RANGE.start]
        .iter()
        .chain(std::iter::repeat_n(&b' ', CHECKSUM_RANGE.len()))
        .chain(bytes[CHECKSUM_RANGE.end..].iter())
        .map(|&b| u32::from(b))
        .sum();

    if stored != computed {
        return Err(SplitError::Decode(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("tar header checksum mismatch: stored {stored}, computed {computed}"),
        )));
    }
    Ok(())
}

/// Content size carried by a PAX extended header, if it has a `size` record.
///
/// When the record appears more than once the last one wins.
pub(crate) fn pax_size(data: &[u8]) -> Result<Option<u64>> {
    let mut size = None;
    for ext in tar::PaxExtensions::new(data) {
        let ext = ext.map_err(SplitError::Decode)?;
        if ext.key_bytes() != PAX_SIZE_KEY {
            continue;
        }
        let value = std::str::from_utf8(ext.value_bytes())
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                SplitError::Decode(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "invalid PAX size record {:?}",
                        String::from_utf8_lossy(ext.value_bytes())
                    ),
                ))
            })?;
        size = Some(value);
    }
    Ok(size)
}
