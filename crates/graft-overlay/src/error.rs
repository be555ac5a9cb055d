//! Overlay error types.

use std::io;
use thiserror::Error;

use graft_glob::PatternError;

/// Result type for overlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Errors surfaced by the overlay.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The path exists in neither the generator tree nor the backing
    /// filesystem.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed path, or an operation a node cannot satisfy (opening a
    /// file-server directory itself, reading a producer-less file node).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A generator callback failed. The callback's error is preserved
    /// verbatim; nothing is cached for the target.
    #[error("generator failed for {path}")]
    Generator {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// The backing filesystem failed with something other than not-found.
    #[error("backing filesystem")]
    Backing(#[source] io::Error),

    /// The glob pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A deferred shutdown hook failed during `close`.
    #[error("close")]
    Close(#[source] anyhow::Error),

    /// The overlay has been closed.
    #[error("filesystem is closed")]
    Closed,
}

impl OverlayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OverlayError::NotFound(_))
    }

    /// Classify a backing filesystem error for `name`, keeping not-found
    /// distinguishable from other I/O failure.
    pub(crate) fn backing(name: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            OverlayError::NotFound(name.to_string())
        } else {
            OverlayError::Backing(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_classification() {
        let nf = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(OverlayError::backing("a", nf).is_not_found());

        let perm = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(
            OverlayError::backing("a", perm),
            OverlayError::Backing(_)
        ));
    }
}
