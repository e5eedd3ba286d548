//! Error types for the tarsplitter library.
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `Result<T, SplitError>`.
//!
//! # Error Categories
//!
//! - **Setup errors**: [`InvalidConfig`], [`CreateDir`], [`OpenDir`], [`GzipHeader`]
//! - **Decode errors**: [`Decode`], [`Unsupported`]
//! - **Write errors**: [`CreateSplit`], [`WriteHeader`], [`WritePayload`], [`SizeMismatch`]
//! - **Close/cleanup errors**: [`FinishArchive`], [`CloseSink`], [`Delete`]
//!
//! Cleanup never hides the error that triggered it. When several things fail
//! (a payload write, then the close that follows it, then the removal of the
//! half-written file) they are reported together as [`Joined`], which keeps
//! every cause available through [`SplitError::causes`].
//!
//! ```
//! use tarsplitter::SplitError;
//!
//! let first = SplitError::InvalidConfig("first".to_string());
//! let second = SplitError::InvalidConfig("second".to_string());
//!
//! let joined = SplitError::join([first, second]).expect("two errors");
//! assert_eq!(joined.causes().len(), 2);
//!
//! // Joining nothing yields nothing.
//! assert!(SplitError::join(Vec::new()).is_none());
//! ```
//!
//! [`InvalidConfig`]: SplitError::InvalidConfig
//! [`CreateDir`]: SplitError::CreateDir
//! [`OpenDir`]: SplitError::OpenDir
//! [`GzipHeader`]: SplitError::GzipHeader
//! [`Decode`]: SplitError::Decode
//! [`Unsupported`]: SplitError::Unsupported
//! [`CreateSplit`]: SplitError::CreateSplit
//! [`WriteHeader`]: SplitError::WriteHeader
//! [`WritePayload`]: SplitError::WritePayload
//! [`SizeMismatch`]: SplitError::SizeMismatch
//! [`FinishArchive`]: SplitError::FinishArchive
//! [`CloseSink`]: SplitError::CloseSink
//! [`Delete`]: SplitError::Delete
//! [`Joined`]: SplitError::Joined

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for operations that may return a SplitError.
pub type Result<T> = std::result::Result<T, SplitError>;

/// Error types for split operations.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// The split configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The destination directory could not be created.
    #[error("failed to create destination directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination directory could not be opened.
    #[error("failed to open destination directory {path}: {source}")]
    OpenDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input was expected to be gzip-compressed but has no valid gzip header.
    #[error("invalid gzip input: {0}")]
    GzipHeader(#[source] io::Error),

    /// The tar stream could not be decoded.
    #[error("failed to read tar stream: {0}")]
    Decode(#[source] io::Error),

    /// The tar stream contains an entry this tool cannot re-emit faithfully.
    #[error("unsupported tar entry {path}: {reason}")]
    Unsupported { path: String, reason: String },

    /// A split file could not be created.
    #[error("failed to create split file {path}: {source}")]
    CreateSplit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing a header block to a split file failed.
    #[error("failed to write tar header to {path}: {source}")]
    WriteHeader {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing entry content to a split file failed.
    #[error("failed to write entry data to {path}: {source}")]
    WritePayload {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An entry's content did not match the size declared by its header.
    #[error("entry {name} declared {expected} bytes but {actual} were written")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// Writing the end-of-archive footer failed.
    #[error("failed to finish tar archive {path}: {source}")]
    FinishArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Flushing or closing the split file (or its gzip stream) failed.
    #[error("failed to close split file {path}: {source}")]
    CloseSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Removing a failed split file failed.
    #[error("failed to remove split file {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Several errors, in the order they occurred.
    #[error("{}", DisplayJoined(.0))]
    Joined(Vec<SplitError>),
}

impl SplitError {
    /// Combine errors into one.
    ///
    /// Nested [`SplitError::Joined`] values are flattened. Returns `None` when
    /// there is nothing to report and the error itself when there is only one.
    pub fn join(errors: impl IntoIterator<Item = SplitError>) -> Option<SplitError> {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                SplitError::Joined(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(SplitError::Joined(flat)),
        }
    }

    /// Join a primary error with the outcome of a follow-up step such as a close.
    pub(crate) fn with_cleanup(self, cleanup: Result<()>) -> SplitError {
        match cleanup {
            Ok(()) => self,
            Err(e) => SplitError::join([self, e]).unwrap_or(SplitError::Joined(Vec::new())),
        }
    }

    /// The individual errors making up this error.
    ///
    /// A non-joined error is its own single cause.
    pub fn causes(&self) -> &[SplitError] {
        match self {
            SplitError::Joined(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }
}

/// Renders joined errors one per line.
struct DisplayJoined<'a>(&'a [SplitError]);

impl fmt::Display for DisplayJoined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_err(msg: &str) -> SplitError {
        SplitError::InvalidConfig(msg.to_string())
    }

    #[test]
    fn test_join_empty_is_none() {
        assert!(SplitError::join(Vec::new()).is_none());
    }

    #[test]
    fn test_join_single_is_unwrapped() {
        let err = SplitError::join([config_err("a")]).unwrap();
        assert!(matches!(err, SplitError::InvalidConfig(ref m) if m == "a"));
        assert_eq!(err.causes().len(), 1);
    }

    #[test]
    fn test_join_flattens_nested() {
        let inner = SplitError::join([config_err("a"), config_err("b")]).unwrap();
        let outer = SplitError::join([inner, config_err("c")]).unwrap();

        let messages: Vec<String> = outer.causes().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "invalid configuration: a",
                "invalid configuration: b",
                "invalid configuration: c",
            ]
        );
    }

    #[test]
    fn test_with_cleanup() {
        let ok = config_err("primary").with_cleanup(Ok(()));
        assert_eq!(ok.causes().len(), 1);

        let joined = config_err("primary").with_cleanup(Err(SplitError::join([
            config_err("close"),
            config_err("delete"),
        ])
        .unwrap()));
        assert_eq!(joined.causes().len(), 3);
        assert_eq!(
            joined.to_string(),
            "invalid configuration: primary\ninvalid configuration: close\ninvalid configuration: delete"
        );
    }
}
