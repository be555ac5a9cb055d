//! The core filesystem trait.

use async_trait::async_trait;
use std::io;
use std::path::Path;

use crate::entry::{DirEntry, Metadata};

/// Abstract filesystem interface.
///
/// All operations use paths relative to the filesystem root; `"."` or the
/// empty path names the root itself. For example, a `LocalFs` rooted at
/// `/home/amy/project` reads `src/main.rs` as
/// `/home/amy/project/src/main.rs`.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Read the entire contents of a file.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// List entries in a directory, sorted by name.
    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Get metadata for a file or directory.
    async fn stat(&self, path: &Path) -> io::Result<Metadata>;

    /// Write data to a file, creating it and any missing parents.
    ///
    /// Returns `Err` if the filesystem is read-only.
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Create a directory (and parent directories if needed).
    ///
    /// Returns `Err` if the filesystem is read-only.
    async fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Returns true if this filesystem rejects writes.
    fn read_only(&self) -> bool;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }
}

/// Error for write attempts on a read-only filesystem.
pub(crate) fn read_only_error() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "filesystem is read-only")
}
