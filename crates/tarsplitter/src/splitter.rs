//! Splitting one tar stream into size-bounded archives.
//!
//! [`TarSplitter`] reads entries from a tar (or tar.gz) stream and writes them
//! to a series of archives named `{base}_{ordinal:06}.tar[.gz]` in a
//! destination directory. An entry is never divided between two archives.
//!
//! # Workflow
//!
//! For every entry read from the input:
//! 1. If no archive is open yet, create one.
//! 2. If the open archive already holds data and
//!    `written + 512 + entry size` would exceed the budget, close it and
//!    create the next one.
//! 3. Write the entry's header and copy its content.
//!
//! An entry larger than the budget on its own ends up alone in an oversized
//! archive. Input with no entries produces no archives at all.
//!
//! GNU long name/link entries and PAX extended headers travel with the entry
//! they describe, and their blocks count towards that entry's size. A PAX
//! `size` record overrides the size field of the header that follows it, as
//! writers do for entries too large for the header field.
//!
//! # Failure
//!
//! Any error stops the run. The archive that was open at that moment is
//! closed and deleted; archives finished earlier are left in place. The
//! returned error includes every failure encountered along the way,
//! cleanup included.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use tarsplitter::{SplitConfig, TarSplitter};
//!
//! let config = SplitConfig::from_mib(100).with_gzip(true);
//! let splitter = TarSplitter::new("/tmp/parts", "backup", config)?;
//! let stats = splitter.split(File::open("backup.tar.gz")?)?;
//!
//! for file in &stats.files {
//!     println!("{} ({} entries)", file.path.display(), file.records);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use serde::Serialize;

use crate::buffer_pool::PooledBuffer;
use crate::config::SplitConfig;
use crate::error::{Result, SplitError};
use crate::input::{create_dest_dir, gzip_decoder};
use crate::naming::SplitNaming;
use crate::sink::SplitSink;
use crate::tar_reader::{TarReader, pax_size};
use crate::tar_writer::{HEADER_BLOCK_SIZE, TarWriter};

/// Largest extension header payload (long name, PAX records) kept in memory.
pub const MAX_EXTENSION_BYTES: u64 = 1024 * 1024;

/// Read buffer in front of an uncompressed input.
const INPUT_BUFFER_SIZE: usize = 64 * 1024;

/// Summary of a completed split.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitStats {
    /// Entries copied, not counting extension headers.
    pub records: u64,

    /// Content bytes copied, not counting headers.
    pub payload_bytes: u64,

    /// Archives written, in ordinal order.
    pub files: Vec<SplitFile>,
}

/// One archive produced by a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitFile {
    /// Sequence number, also embedded in the file name.
    pub ordinal: u64,

    /// Location of the archive.
    pub path: PathBuf,

    /// Entries in the archive.
    pub records: u64,

    /// Header and content bytes counted against the budget.
    pub bytes: u64,
}

/// Splits tar streams into archives in one destination directory.
///
/// The split ordinal survives across calls: splitting a second stream with
/// the same splitter continues numbering where the first left off.
#[derive(Debug)]
pub struct TarSplitter {
    dir: Arc<Dir>,
    dir_path: PathBuf,
    naming: SplitNaming,
    config: SplitConfig,
}

/// The archive currently being filled.
struct OpenSplit<W: Write> {
    writer: TarWriter<W>,
    ordinal: u64,
    records: u64,
}

/// An entry ready to be written, with the extension headers preceding it.
struct Record<'h, I> {
    extensions: I,
    header: &'h tar::Header,
    size: u64,
}

/// An extension header waiting for the entry it describes.
struct PendingExtension {
    header: tar::Header,
    data: Vec<u8>,
}

impl TarSplitter {
    /// Create a splitter writing `{base_name}_NNNNNN.tar[.gz]` into `dest_dir`.
    ///
    /// The destination directory is created, with parents, if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or base name is invalid, or the
    /// directory cannot be created or opened.
    pub fn new(
        dest_dir: impl AsRef<Path>,
        base_name: impl Into<String>,
        config: SplitConfig,
    ) -> Result<Self> {
        config.validate()?;
        let base_name = base_name.into();
        if base_name.is_empty() || base_name.contains('/') {
            return Err(SplitError::InvalidConfig(format!(
                "invalid output base name {base_name:?}"
            )));
        }

        let dir_path = dest_dir.as_ref().to_path_buf();
        create_dest_dir(&dir_path)?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority()).map_err(|source| {
            SplitError::OpenDir {
                path: dir_path.clone(),
                source,
            }
        })?;

        Ok(Self {
            dir: Arc::new(dir),
            dir_path,
            naming: SplitNaming::new(base_name, config.gzip_output),
            config,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// The destination directory.
    pub fn dest_dir(&self) -> &Path {
        &self.dir_path
    }

    /// The base name of produced archives.
    pub fn base_name(&self) -> &str {
        self.naming.base_name()
    }

    /// Ordinal the next created archive will get.
    pub fn next_ordinal(&self) -> u64 {
        self.naming.peek()
    }

    /// Split `input` into archives.
    ///
    /// The input is read to the end of the tar stream. On success every
    /// archive has been closed and is listed in the returned stats; on error
    /// the archive open at the time has been removed.
    pub fn split<'a, R: Read + 'a>(&self, input: R) -> Result<SplitStats> {
        let compression = self
            .config
            .gzip_output
            .then(|| self.config.compression());
        self.split_into(input, |name| {
            SplitSink::create(Arc::clone(&self.dir), &self.dir_path, name, compression)
        })
    }

    /// Split `input`, opening each archive's sink with `create_sink`.
    pub(crate) fn split_into<'a, R, W, F>(&self, input: R, mut create_sink: F) -> Result<SplitStats>
    where
        R: Read + 'a,
        W: Write,
        F: FnMut(String) -> Result<SplitSink<W>>,
    {
        let input: Box<dyn Read + 'a> = if self.config.gzip_input {
            gzip_decoder(input)?
        } else {
            Box::new(BufReader::with_capacity(INPUT_BUFFER_SIZE, input))
        };
        let mut reader = TarReader::new(input);

        let mut buf = PooledBuffer::get();
        let mut stats = SplitStats::default();
        let mut current: Option<OpenSplit<W>> = None;
        let mut pending: Vec<PendingExtension> = Vec::new();

        loop {
            let header = match reader.next_header() {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => return Err(abort(current, e)),
            };
            let header_size = match header.entry_size() {
                Ok(size) => size,
                Err(e) => return Err(abort(current, SplitError::Decode(e))),
            };

            if is_extension(header.entry_type()) {
                match read_extension(&mut reader, header, header_size) {
                    Ok(ext) => pending.push(ext),
                    Err(e) => return Err(abort(current, e)),
                }
                continue;
            }

            if let Some(reason) = unsupported_reason(&header) {
                let err = SplitError::Unsupported {
                    path: entry_name(&header),
                    reason,
                };
                return Err(abort(current, err));
            }

            let size = match content_size(&pending, header_size) {
                Ok(size) => size,
                Err(e) => return Err(abort(current, e)),
            };
            let record_size = pending
                .iter()
                .map(|ext| HEADER_BLOCK_SIZE + ext.data.len() as u64)
                .sum::<u64>()
                + HEADER_BLOCK_SIZE
                + size;

            let mut open = match current.take() {
                None => self.next_split(&mut create_sink)?,
                Some(open) if self.needs_rollover(&open, record_size) => {
                    tracing::debug!(
                        "rolling over from {} at {} bytes for a {} byte entry",
                        open.writer.path().display(),
                        open.writer.written(),
                        record_size
                    );
                    open.finish(&mut stats)?;
                    self.next_split(&mut create_sink)?
                }
                Some(open) => open,
            };

            if record_size > self.config.max_bytes_per_split {
                tracing::warn!(
                    "entry {} needs {} bytes, more than the {} byte split size; writing it alone to {}",
                    entry_name(&header),
                    record_size,
                    self.config.max_bytes_per_split,
                    open.writer.path().display()
                );
            }

            let record = Record {
                extensions: pending.drain(..),
                header: &header,
                size,
            };
            if let Err(e) = open.write_record(record, &mut reader, &mut buf) {
                return Err(abort(Some(open), e));
            }
            stats.records += 1;
            stats.payload_bytes += size;
            current = Some(open);
        }

        if !pending.is_empty() {
            let err = SplitError::Decode(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} extension header(s) at end of archive with no entry following",
                    pending.len()
                ),
            ));
            return Err(abort(current, err));
        }

        if let Some(open) = current {
            open.finish(&mut stats)?;
        }

        tracing::info!(
            "split {} entries ({} content bytes) into {} archive(s)",
            stats.records,
            stats.payload_bytes,
            stats.files.len()
        );
        Ok(stats)
    }

    /// Whether `record_size` more bytes would push the open archive past
    /// the budget.
    ///
    /// An archive that holds nothing yet always takes the record, so an
    /// oversized first entry never leaves an empty archive in front of it.
    fn needs_rollover<W: Write>(&self, open: &OpenSplit<W>, record_size: u64) -> bool {
        let written = open.writer.written();
        written > 0 && written.saturating_add(record_size) > self.config.max_bytes_per_split
    }

    /// Create the archive with the next ordinal.
    fn next_split<W, F>(&self, create_sink: &mut F) -> Result<OpenSplit<W>>
    where
        W: Write,
        F: FnMut(String) -> Result<SplitSink<W>>,
    {
        let (ordinal, name) = self.naming.next();
        let sink = create_sink(name)?;
        tracing::debug!("created split {}", sink.path().display());

        Ok(OpenSplit {
            writer: TarWriter::new(sink),
            ordinal,
            records: 0,
        })
    }
}

impl<W: Write> OpenSplit<W> {
    /// Write the pending extension headers and the entry itself.
    fn write_record<R: Read>(
        &mut self,
        record: Record<'_, impl Iterator<Item = PendingExtension>>,
        reader: &mut TarReader<R>,
        buf: &mut [u8],
    ) -> Result<()> {
        for ext in record.extensions {
            self.writer.write_header(&ext.header, ext.data.len() as u64)?;
            self.writer.copy_payload(&mut ext.data.as_slice(), buf)?;
        }

        self.writer.write_header(record.header, record.size)?;
        self.writer
            .copy_payload(&mut reader.content(record.size), buf)?;
        self.records += 1;

        tracing::trace!(
            "wrote {} to {}",
            entry_name(record.header),
            self.writer.path().display()
        );
        Ok(())
    }

    /// Close the archive and record it in `stats`.
    fn finish(self, stats: &mut SplitStats) -> Result<()> {
        let path = self.writer.path().to_path_buf();
        let bytes = self.writer.written();
        self.writer.close()?;

        tracing::info!(
            "finished {} ({} entries, {} bytes)",
            path.display(),
            self.records,
            bytes
        );
        stats.files.push(SplitFile {
            ordinal: self.ordinal,
            path,
            records: self.records,
            bytes,
        });
        Ok(())
    }
}

/// Close (and so remove) the open archive after `err`, keeping all errors.
fn abort<W: Write>(open: Option<OpenSplit<W>>, err: SplitError) -> SplitError {
    match open {
        Some(open) => {
            tracing::warn!(
                "aborting split, removing {}: {}",
                open.writer.path().display(),
                err
            );
            err.with_cleanup(open.writer.discard())
        }
        None => err,
    }
}

fn is_extension(entry_type: tar::EntryType) -> bool {
    entry_type.is_gnu_longname() || entry_type.is_gnu_longlink() || entry_type.is_pax_local_extensions()
}

/// Buffer an extension entry's content.
fn read_extension<R: Read>(
    reader: &mut TarReader<R>,
    header: tar::Header,
    size: u64,
) -> Result<PendingExtension> {
    if size > MAX_EXTENSION_BYTES {
        return Err(SplitError::Decode(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("extension header of {size} bytes exceeds the {MAX_EXTENSION_BYTES} byte limit"),
        )));
    }

    let mut data = Vec::with_capacity(size as usize);
    reader
        .content(size)
        .read_to_end(&mut data)
        .map_err(SplitError::Decode)?;
    if data.len() as u64 != size {
        return Err(SplitError::Decode(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "extension header declared {size} bytes but only {} were read",
                data.len()
            ),
        )));
    }
    Ok(PendingExtension { header, data })
}

/// Content size of an entry: the last PAX `size` record among its extension
/// headers, or else the header's own size field.
fn content_size(extensions: &[PendingExtension], header_size: u64) -> Result<u64> {
    let mut size = header_size;
    for ext in extensions {
        if ext.header.entry_type().is_pax_local_extensions()
            && let Some(pax) = pax_size(&ext.data)?
        {
            size = pax;
        }
    }
    Ok(size)
}

fn entry_name(header: &tar::Header) -> String {
    String::from_utf8_lossy(&header.path_bytes()).into_owned()
}

/// Why an entry cannot be copied verbatim, if it cannot.
fn unsupported_reason(header: &tar::Header) -> Option<String> {
    if header.entry_type().is_gnu_sparse() && header.as_gnu().is_some_and(|gnu| gnu.is_extended()) {
        return Some("GNU sparse entries with extended sparse maps are not supported".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::open_dir;
    use std::fs::File;
    use std::io::Cursor;
    use tar::{Builder, EntryType, Header};

    /// Writes through to a file until `room` bytes are used up, then fails.
    struct ShortFile {
        file: File,
        room: usize,
    }

    impl Write for ShortFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
            }
            let n = self.file.write(&buf[..buf.len().min(self.room)])?;
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    /// Sink factory whose `failing`-th archive (0-based) only has `room` bytes.
    fn short_sinks(
        dir: &Path,
        failing: usize,
        room: usize,
    ) -> impl FnMut(String) -> Result<SplitSink<ShortFile>> {
        let handle = open_dir(dir);
        let dir = dir.to_path_buf();
        let mut created = 0;
        move |name| {
            let path = dir.join(&name);
            let file = File::create(&path).unwrap();
            let room = if created == failing { room } else { usize::MAX };
            created += 1;
            Ok(SplitSink::with_writer(
                Arc::clone(&handle),
                path,
                name,
                ShortFile { file, room },
                None,
            ))
        }
    }

    fn build_tar(sizes: &[usize]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (i, size) in sizes.iter().enumerate() {
            let header = regular_header(&format!("file{i}"), *size as u64);
            builder.append(&header, &vec![i as u8; *size][..]).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn read_names(path: &Path) -> Vec<(String, usize)> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (name, data.len())
            })
            .collect()
    }

    fn list_dir(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_payload_write_failure_keeps_finished_splits() {
        let dir = tempfile::tempdir().unwrap();
        let splitter = TarSplitter::new(dir.path(), "w", SplitConfig::new(1000)).unwrap();

        // The second archive fails partway through file1's content
        let err = splitter
            .split_into(
                Cursor::new(build_tar(&[100, 900, 50])),
                short_sinks(dir.path(), 1, 700),
            )
            .unwrap_err();

        assert!(matches!(err, SplitError::WritePayload { .. }), "{err}");
        assert_eq!(list_dir(dir.path()), ["w_000000.tar"]);
        assert_eq!(
            read_names(&dir.path().join("w_000000.tar")),
            [("file0".to_string(), 100)]
        );
    }

    #[test]
    fn test_header_write_failure_keeps_finished_splits() {
        let dir = tempfile::tempdir().unwrap();
        let splitter = TarSplitter::new(dir.path(), "h", SplitConfig::new(1000)).unwrap();

        // The third archive cannot take a full header block
        let err = splitter
            .split_into(
                Cursor::new(build_tar(&[100, 900, 50])),
                short_sinks(dir.path(), 2, 100),
            )
            .unwrap_err();

        assert!(matches!(err, SplitError::WriteHeader { .. }), "{err}");
        assert_eq!(list_dir(dir.path()), ["h_000000.tar", "h_000001.tar"]);
        assert_eq!(
            read_names(&dir.path().join("h_000000.tar")),
            [("file0".to_string(), 100)]
        );
        assert_eq!(
            read_names(&dir.path().join("h_000001.tar")),
            [("file1".to_string(), 900)]
        );
    }

    #[test]
    fn test_pax_size_drives_rollover() {
        let dir = tempfile::tempdir().unwrap();

        let mut builder = Builder::new(Vec::new());
        builder
            .append_pax_extensions([("size", b"2048".as_slice())])
            .unwrap();
        builder
            .get_mut()
            .extend_from_slice(regular_header("big.img", 0).as_bytes());
        builder.get_mut().extend_from_slice(&[0u8; 2048]);
        builder
            .append(&regular_header("after.txt", 4), &b"tail"[..])
            .unwrap();
        let input = builder.into_inner().unwrap();

        // big.img needs 512 + 13 + 512 + 2048 bytes; after.txt no longer fits
        let splitter = TarSplitter::new(dir.path(), "p", SplitConfig::new(3200)).unwrap();
        let stats = splitter.split(Cursor::new(input)).unwrap();

        assert_eq!(stats.records, 2);
        assert_eq!(stats.payload_bytes, 2052);
        assert_eq!(stats.files.len(), 2);
        assert_eq!(
            read_names(&stats.files[0].path),
            [("big.img".to_string(), 2048)]
        );
        assert_eq!(
            read_names(&stats.files[1].path),
            [("after.txt".to_string(), 4)]
        );
    }

    fn regular_header(path: &str, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_path(path).unwrap();
        header.set_size(size);
        header.set_mode(0o644);
        header.set_cksum();
        header
    }

    #[test]
    fn test_is_extension() {
        assert!(is_extension(EntryType::GNULongName));
        assert!(is_extension(EntryType::GNULongLink));
        assert!(is_extension(EntryType::XHeader));
        // Global PAX headers are records of their own
        assert!(!is_extension(EntryType::XGlobalHeader));
        assert!(!is_extension(EntryType::Regular));
        assert!(!is_extension(EntryType::Directory));
    }

    #[test]
    fn test_plain_sparse_is_supported() {
        let mut header = regular_header("holes.img", 0);
        header.set_entry_type(EntryType::GNUSparse);
        assert!(unsupported_reason(&header).is_none());
        assert!(unsupported_reason(&regular_header("a", 1)).is_none());
    }

    #[test]
    fn test_extended_sparse_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let mut header = regular_header("holes.img", 0);
        header.set_entry_type(EntryType::GNUSparse);
        header.as_gnu_mut().unwrap().isextended[0] = 1;
        header.set_cksum();

        let mut input = header.as_bytes().to_vec();
        input.extend_from_slice(&[0u8; 1024]);

        let splitter = TarSplitter::new(dir.path(), "sparse", SplitConfig::new(1 << 20)).unwrap();
        let err = splitter.split(Cursor::new(input)).unwrap_err();
        match err {
            SplitError::Unsupported { path, .. } => assert_eq!(path, "holes.img"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_oversized_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let value = vec![b'a'; MAX_EXTENSION_BYTES as usize];
        let mut builder = Builder::new(Vec::new());
        builder
            .append_pax_extensions([("comment", value.as_slice())])
            .unwrap();
        builder.append(&regular_header("after", 0), io::empty()).unwrap();
        let input = builder.into_inner().unwrap();

        let splitter = TarSplitter::new(dir.path(), "big", SplitConfig::new(1 << 30)).unwrap();
        let err = splitter.split(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, SplitError::Decode(_)), "{err}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_global_pax_header_is_its_own_record() {
        let dir = tempfile::tempdir().unwrap();

        let data = b"18 comment=global\n";
        let mut global = Header::new_ustar();
        global.set_entry_type(EntryType::XGlobalHeader);
        global.set_path("pax_global_header").unwrap();
        global.set_size(data.len() as u64);
        global.set_cksum();

        let mut builder = Builder::new(Vec::new());
        builder.append(&global, &data[..]).unwrap();
        builder.append(&regular_header("file", 4), &b"data"[..]).unwrap();
        let input = builder.into_inner().unwrap();

        let splitter = TarSplitter::new(dir.path(), "g", SplitConfig::new(1 << 20)).unwrap();
        let stats = splitter.split(Cursor::new(input)).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.files.len(), 1);
        assert_eq!(stats.files[0].records, 2);
    }

    #[test]
    fn test_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let config = SplitConfig::new(4096).with_gzip(true);
        let splitter = TarSplitter::new(dir.path(), "acc", config.clone()).unwrap();

        assert_eq!(splitter.config(), &config);
        assert_eq!(splitter.dest_dir(), dir.path());
        assert_eq!(splitter.base_name(), "acc");
        assert_eq!(splitter.next_ordinal(), 0);
    }
}
