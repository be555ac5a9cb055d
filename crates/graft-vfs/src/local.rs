//! Local filesystem backend.
//!
//! Root-jailed access to a real directory, with optional read-only mode.

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::entry::{DirEntry, EntryKind, Metadata};
use crate::traits::{Filesystem, read_only_error};

/// Local filesystem rooted at a directory.
///
/// All paths are resolved relative to `root`; components that would escape
/// the root (`..`, absolute prefixes) are rejected.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    read_only: bool,
}

impl LocalFs {
    /// Create a writable local filesystem rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: true,
        }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative path onto the root, refusing escapes.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut out = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(seg) => out.push(seg),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes root: {}", path.display()),
                    ));
                }
            }
        }
        Ok(out)
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.read_only {
            Err(read_only_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use crate::entry::{MODE_DIR, MODE_FILE};
    if meta.is_dir() { MODE_DIR } else { MODE_FILE }
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        let mut dir = fs::read_dir(&full).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if meta.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                },
                mode: mode_bits(&meta),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let meta = fs::metadata(self.resolve(path)?).await?;
        Ok(Metadata {
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            size: meta.len(),
            mode: mode_bits(&meta),
        })
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.check_writable()?;
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, data).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.check_writable()?;
        fs::create_dir_all(self.resolve(path)?).await
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());

        fs.write(Path::new("sub/file.txt"), b"local").await.unwrap();
        assert_eq!(fs.read(Path::new("sub/file.txt")).await.unwrap(), b"local");

        let entries = fs.list(Path::new(".")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "sub");
        assert!(entries[0].is_dir());
    }

    #[tokio::test]
    async fn read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::read_only(dir.path());
        let err = fs.write(Path::new("f"), b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let err = fs.read(Path::new("../outside")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let err = fs.read(Path::new("absent.txt")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
