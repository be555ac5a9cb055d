//! Read-memoising filesystem decorator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::entry::{DirEntry, Metadata};
use crate::traits::Filesystem;

/// Memoises successful `read`, `list`, and `stat` calls of an inner
/// filesystem.
///
/// The overlay's `sync` wraps its backing store in a throwaway `CachedFs`
/// so a full materialisation pass touches each backing path once without
/// polluting any longer-lived cache. Failures are not memoised. Writes
/// pass through to the inner filesystem unobserved.
pub struct CachedFs {
    inner: Arc<dyn Filesystem>,
    reads: RwLock<HashMap<PathBuf, Vec<u8>>>,
    lists: RwLock<HashMap<PathBuf, Vec<DirEntry>>>,
    stats: RwLock<HashMap<PathBuf, Metadata>>,
}

impl CachedFs {
    /// Wrap an inner filesystem.
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        Self {
            inner,
            reads: RwLock::new(HashMap::new()),
            lists: RwLock::new(HashMap::new()),
            stats: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Filesystem for CachedFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some(data) = self.reads.read().await.get(path) {
            return Ok(data.clone());
        }
        let data = self.inner.read(path).await?;
        self.reads
            .write()
            .await
            .insert(path.to_path_buf(), data.clone());
        Ok(data)
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        if let Some(entries) = self.lists.read().await.get(path) {
            return Ok(entries.clone());
        }
        let entries = self.inner.list(path).await?;
        self.lists
            .write()
            .await
            .insert(path.to_path_buf(), entries.clone());
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        if let Some(meta) = self.stats.read().await.get(path) {
            return Ok(*meta);
        }
        let meta = self.inner.stat(path).await?;
        self.stats.write().await.insert(path.to_path_buf(), meta);
        Ok(meta)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.inner.write(path, data).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.inner.mkdir(path).await
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;

    #[tokio::test]
    async fn serves_stale_reads_after_mutation() {
        let mem = Arc::new(MemoryFs::new());
        mem.write(Path::new("f"), b"v1").await.unwrap();

        let cached = CachedFs::new(mem.clone());
        assert_eq!(cached.read(Path::new("f")).await.unwrap(), b"v1");

        // Mutate underneath; the cached layer keeps the first answer.
        mem.write(Path::new("f"), b"v2").await.unwrap();
        assert_eq!(cached.read(Path::new("f")).await.unwrap(), b"v1");
        assert_eq!(mem.read(Path::new("f")).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn failures_are_not_memoised() {
        let mem = Arc::new(MemoryFs::new());
        let cached = CachedFs::new(mem.clone());

        assert!(cached.read(Path::new("late")).await.is_err());
        mem.write(Path::new("late"), b"now").await.unwrap();
        assert_eq!(cached.read(Path::new("late")).await.unwrap(), b"now");
    }

    #[tokio::test]
    async fn listings_are_memoised() {
        let mem = Arc::new(MemoryFs::new());
        mem.write(Path::new("a"), b"a").await.unwrap();

        let cached = CachedFs::new(mem.clone());
        assert_eq!(cached.list(Path::new(".")).await.unwrap().len(), 1);

        mem.write(Path::new("b"), b"b").await.unwrap();
        assert_eq!(cached.list(Path::new(".")).await.unwrap().len(), 1);
    }
}
