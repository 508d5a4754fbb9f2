//! Error types for scanning operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a scan run.
///
/// Per-item read failures never show up here: they are resolved through
/// the caller's error decision and end up in the failure maps of
/// [`DirectoryValue`](crate::DirectoryValue).
#[derive(Debug, Error)]
pub enum ScanError {
    /// The caller's callback aborted the run.
    #[error("Scan aborted: {message}")]
    Aborted { message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked.
    #[error("Traverser thread {thread_idx} panicked")]
    WorkerPanicked { thread_idx: usize },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an abort error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }

    /// Check whether the run was aborted by the caller.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::Io { .. }));
        assert!(err.to_string().contains("/test/path"));
    }

    #[test]
    fn test_aborted() {
        let err = ScanError::aborted("user cancelled");
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "Scan aborted: user cancelled");
    }
}
