//! In-memory filesystem.
//!
//! Used as a test backing store and as a `sync` target. All data is
//! ephemeral.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

use crate::entry::{DirEntry, Metadata};
use crate::traits::Filesystem;

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem.
///
/// Thread-safe via an internal `RwLock`. Parent directories are created
/// implicitly on write.
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: RwLock<HashMap<PathBuf, Node>>,
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip the root and `.` components; `..` is not resolved, it simply
    /// never matches a stored key.
    fn normalize(path: &Path) -> PathBuf {
        let mut out = PathBuf::new();
        for component in path.components() {
            if let Component::Normal(seg) = component {
                out.push(seg);
            }
        }
        out
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("not found: {}", path.display()),
        )
    }

    fn insert_parents(nodes: &mut HashMap<PathBuf, Node>, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(seg) = component {
                current.push(seg);
                nodes.entry(current.clone()).or_insert(Node::Dir);
            }
        }
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let key = Self::normalize(path);
        match self.nodes.read().await.get(&key) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(Self::not_found(path)),
        }
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let key = Self::normalize(path);
        let nodes = self.nodes.read().await;

        // The root always exists; any other path must be a known directory.
        if !key.as_os_str().is_empty() {
            match nodes.get(&key) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("not a directory: {}", path.display()),
                    ));
                }
                None => return Err(Self::not_found(path)),
            }
        }

        let mut entries: Vec<DirEntry> = nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(key.as_path()) && **p != key)
            .filter_map(|(p, node)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(match node {
                    Node::File(_) => DirEntry::file(name),
                    Node::Dir => DirEntry::dir(name),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let key = Self::normalize(path);
        if key.as_os_str().is_empty() {
            return Ok(Metadata::dir());
        }
        match self.nodes.read().await.get(&key) {
            Some(Node::File(data)) => Ok(Metadata::file(data.len() as u64)),
            Some(Node::Dir) => Ok(Metadata::dir()),
            None => Err(Self::not_found(path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let key = Self::normalize(path);
        let mut nodes = self.nodes.write().await;
        if let Some(Node::Dir) = nodes.get(&key) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            ));
        }
        Self::insert_parents(&mut nodes, &key);
        nodes.insert(key, Node::File(data.to_vec()));
        Ok(())
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        let key = Self::normalize(path);
        let mut nodes = self.nodes.write().await;
        if let Some(Node::File(_)) = nodes.get(&key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            ));
        }
        Self::insert_parents(&mut nodes, &key);
        if !key.as_os_str().is_empty() {
            nodes.insert(key, Node::Dir);
        }
        Ok(())
    }

    fn read_only(&self) -> bool {
        false
    }
}
