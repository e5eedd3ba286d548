//! Input detection and decoding.
//!
//! The splitter itself is told whether its input is gzip-compressed. This
//! module holds the helpers around that decision: sniffing a file's magic
//! bytes, wrapping a reader in a gzip decoder, and preparing the destination
//! directory.

use std::fs::{DirBuilder, File};
use std::io::{self, Cursor, Read};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{Result, SplitError};

/// The first two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Permissions for directories created by [`create_dest_dir`].
const DEST_DIR_MODE: u32 = 0o750;

/// Check whether the file at `path` starts with the gzip magic number.
///
/// Files shorter than two bytes are reported as not compressed.
pub fn is_gzip_file(path: impl AsRef<Path>) -> io::Result<bool> {
    let file = File::open(path)?;
    let mut magic = Vec::with_capacity(GZIP_MAGIC.len());
    file.take(GZIP_MAGIC.len() as u64).read_to_end(&mut magic)?;
    Ok(magic == GZIP_MAGIC)
}

/// Create the destination directory and any missing parents.
///
/// Existing directories are left untouched.
pub fn create_dest_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    DirBuilder::new()
        .recursive(true)
        .mode(DEST_DIR_MODE)
        .create(path)
        .map_err(|source| SplitError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Wrap `input` so that reading it yields the decompressed tar stream.
///
/// The gzip magic is checked eagerly so that a plain tar (or empty) input
/// fails here rather than somewhere inside the first tar header read.
pub(crate) fn gzip_decoder<'a, R: Read + 'a>(mut input: R) -> Result<Box<dyn Read + 'a>> {
    let mut magic = [0u8; 2];
    input.read_exact(&mut magic).map_err(SplitError::GzipHeader)?;
    if magic != GZIP_MAGIC {
        return Err(SplitError::GzipHeader(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "expected gzip magic {:02x}{:02x}, found {:02x}{:02x}",
                GZIP_MAGIC[0], GZIP_MAGIC[1], magic[0], magic[1]
            ),
        )));
    }

    Ok(Box::new(MultiGzDecoder::new(Cursor::new(magic).chain(input))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_is_gzip_file() {
        let dir = tempfile::tempdir().unwrap();

        let gz_path = dir.path().join("a.tar.gz");
        let mut enc = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        enc.write_all(b"hello").unwrap();
        enc.finish().unwrap();
        assert!(is_gzip_file(&gz_path).unwrap());

        let plain_path = dir.path().join("a.tar");
        std::fs::write(&plain_path, b"hello").unwrap();
        assert!(!is_gzip_file(&plain_path).unwrap());

        let short_path = dir.path().join("short");
        std::fs::write(&short_path, [0x1f]).unwrap();
        assert!(!is_gzip_file(&short_path).unwrap());

        let empty_path = dir.path().join("empty");
        std::fs::write(&empty_path, b"").unwrap();
        assert!(!is_gzip_file(&empty_path).unwrap());

        assert!(is_gzip_file(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_create_dest_dir_nested() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/c");

        create_dest_dir(&dest).unwrap();
        assert!(dest.is_dir());
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777 & !0o750, 0);

        // Existing directory is fine
        create_dest_dir(&dest).unwrap();
    }

    #[test]
    fn test_create_dest_dir_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = create_dest_dir(&file).unwrap_err();
        assert!(matches!(err, SplitError::CreateDir { .. }));
    }

    #[test]
    fn test_gzip_decoder_roundtrip() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(b"payload").unwrap();
        let compressed = enc.finish().unwrap();

        let mut out = String::new();
        gzip_decoder(&compressed[..])
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "payload");
    }

    #[test]
    fn test_gzip_decoder_concatenated_members() {
        let mut data = Vec::new();
        for part in [&b"first "[..], &b"second"[..]] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
            enc.write_all(part).unwrap();
            data.extend(enc.finish().unwrap());
        }

        let mut out = String::new();
        gzip_decoder(&data[..])
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "first second");
    }

    #[test]
    fn test_gzip_decoder_rejects_plain_input() {
        assert!(matches!(
            gzip_decoder(&b"plain tar"[..]),
            Err(SplitError::GzipHeader(_))
        ));
        assert!(matches!(
            gzip_decoder(&b""[..]),
            Err(SplitError::GzipHeader(_))
        ));
    }
}
