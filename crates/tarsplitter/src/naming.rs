//! Output naming.
//!
//! Split archives are named `{base}_{ordinal:06}.tar` (or `.tar.gz`), with the
//! ordinal counting up from zero for every archive a splitter creates.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Extensions stripped from the end of an input name to form the base name.
const ARCHIVE_EXTENSIONS: &[&str] = &[".tar", ".tgz", ".gz"];

/// Width of the zero-padded ordinal in split file names.
pub const ORDINAL_WIDTH: usize = 6;

/// Derive an output base name from an input file name.
///
/// Trailing archive extensions are removed repeatedly, so `backup.tar.gz`
/// becomes `backup` rather than `backup.tar`. A name made up only of
/// extensions is kept as is.
///
/// ```
/// use tarsplitter::base_name;
///
/// assert_eq!(base_name("archive.tar.gz"), "archive");
/// assert_eq!(base_name("archive.tar"), "archive");
/// assert_eq!(base_name("archive"), "archive");
/// assert_eq!(base_name("/data/nightly.tgz"), "nightly");
/// ```
pub fn base_name(input: impl AsRef<Path>) -> String {
    let file_name = input
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = file_name.as_str();
    while let Some(stripped) = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .filter(|s| !s.is_empty())
    {
        name = stripped;
    }
    name.to_string()
}

/// File name of the split archive with the given ordinal.
pub fn split_file_name(base_name: &str, ordinal: u64, gzip: bool) -> String {
    let ext = if gzip { ".tar.gz" } else { ".tar" };
    format!("{base_name}_{ordinal:0width$}{ext}", width = ORDINAL_WIDTH)
}

/// Hands out split file names in ordinal order.
///
/// The ordinal lives behind a mutex so a splitter can be shared between
/// threads; each call to [`next`](Self::next) claims exactly one ordinal.
#[derive(Debug)]
pub(crate) struct SplitNaming {
    base_name: String,
    gzip: bool,
    next_ordinal: Mutex<u64>,
}

impl SplitNaming {
    pub(crate) fn new(base_name: impl Into<String>, gzip: bool) -> Self {
        Self {
            base_name: base_name.into(),
            gzip,
            next_ordinal: Mutex::new(0),
        }
    }

    /// Claim the next ordinal and return it with its file name.
    pub(crate) fn next(&self) -> (u64, String) {
        let mut guard = self
            .next_ordinal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let ordinal = *guard;
        *guard += 1;
        (ordinal, split_file_name(&self.base_name, ordinal, self.gzip))
    }

    /// The ordinal the next created archive will get.
    pub(crate) fn peek(&self) -> u64 {
        *self
            .next_ordinal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn base_name(&self) -> &str {
        &self.base_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_base_name_strips_extensions() {
        assert_eq!(base_name("archive.tar.gz"), "archive");
        assert_eq!(base_name("archive.tar"), "archive");
        assert_eq!(base_name("archive.gz"), "archive");
        assert_eq!(base_name("archive.tgz"), "archive");
        assert_eq!(base_name("archive.tar.gz.tar"), "archive");
        assert_eq!(base_name("archive"), "archive");
    }

    #[test]
    fn test_base_name_keeps_other_dots() {
        assert_eq!(base_name("release-1.2.3.tar.gz"), "release-1.2.3");
        assert_eq!(base_name("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_base_name_uses_file_name_only() {
        assert_eq!(base_name("/srv/backups/db.tar.gz"), "db");
        assert_eq!(base_name("relative/dir/x.tar"), "x");
    }

    #[test]
    fn test_base_name_only_extension() {
        assert_eq!(base_name(".tar"), ".tar");
        assert_eq!(base_name(".tar.gz"), ".tar");
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(split_file_name("a", 0, false), "a_000000.tar");
        assert_eq!(split_file_name("a", 42, true), "a_000042.tar.gz");
        assert_eq!(split_file_name("a", 1_234_567, false), "a_1234567.tar");
    }

    #[test]
    fn test_naming_sequence() {
        let naming = SplitNaming::new("data", true);
        assert_eq!(naming.peek(), 0);
        assert_eq!(naming.next(), (0, "data_000000.tar.gz".to_string()));
        assert_eq!(naming.next(), (1, "data_000001.tar.gz".to_string()));
        assert_eq!(naming.peek(), 2);
    }

    #[test]
    fn test_naming_concurrent_ordinals_unique() {
        let naming = Arc::new(SplitNaming::new("x", false));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let naming = Arc::clone(&naming);
                std::thread::spawn(move || (0..50).map(|_| naming.next().0).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }
}
