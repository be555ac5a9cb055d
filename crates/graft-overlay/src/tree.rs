//! Trie of generator bindings.
//!
//! The tree owns the generated half of the namespace: each node is a file
//! or directory, optionally carrying a producer binding. Children keep
//! insertion order so listings are stable.

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use graft_vfs::{DirEntry, EntryKind, Filesystem, MODE_DIR, MODE_FILE};

use crate::error::{OverlayError, Result};
use crate::generator::{DirGenerator, FileGenerator};

/// A producer bound to a tree node.
#[derive(Clone)]
pub(crate) enum Binding {
    /// Generates one file at the node's own path.
    File(Arc<dyn FileGenerator>),
    /// Populates the node's subtree on first access.
    Dir(Arc<dyn DirGenerator>),
    /// Generates a file per requested descendant.
    Server(Arc<dyn FileGenerator>),
    /// Serves a foreign filesystem mounted at `dir`.
    Mount {
        fs: Arc<dyn Filesystem>,
        dir: String,
    },
}

impl Binding {
    /// Whether a lookup below this node should stop here.
    pub fn serves_descendants(&self) -> bool {
        !matches!(self, Binding::File(_))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::File(_) => f.write_str("File"),
            Binding::Dir(_) => f.write_str("Dir"),
            Binding::Server(_) => f.write_str("Server"),
            Binding::Mount { dir, .. } => write!(f, "Mount({dir})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    File,
    Dir,
}

#[derive(Debug)]
struct Node {
    name: String,
    kind: NodeKind,
    mode: u32,
    binding: Option<Binding>,
    children: Vec<Node>,
}

impl Node {
    fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Dir,
            mode: MODE_DIR,
            binding: None,
            children: Vec::new(),
        }
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Snapshot of a resolved node, detached from the tree lock.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    /// The node's own path (equals the request only when `exact`).
    pub path: String,
    pub kind: NodeKind,
    pub mode: u32,
    pub binding: Option<Binding>,
    /// True when the request named this node; false when the node is the
    /// nearest ancestor serving descendants.
    pub exact: bool,
}

/// In-memory trie of path segments.
#[derive(Debug)]
pub(crate) struct Tree {
    root: RwLock<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::dir(".")),
        }
    }

    /// Bind a file producer, creating missing ancestor directories.
    pub async fn bind_file(&self, path: &str, binding: Binding) -> Result<()> {
        if path == "." {
            return Err(OverlayError::InvalidPath(
                "cannot bind a file at the overlay root".to_string(),
            ));
        }
        self.bind(path, NodeKind::File, MODE_FILE, binding).await
    }

    /// Bind a directory producer, creating missing ancestor directories.
    ///
    /// Rebinding replaces the producer but preserves existing children.
    pub async fn bind_dir(&self, path: &str, binding: Binding) -> Result<()> {
        if path == "." {
            self.root.write().await.binding = Some(binding);
            return Ok(());
        }
        self.bind(path, NodeKind::Dir, MODE_DIR, binding).await
    }

    async fn bind(&self, path: &str, kind: NodeKind, mode: u32, binding: Binding) -> Result<()> {
        let mut root = self.root.write().await;
        let mut node = &mut *root;
        let segments: Vec<&str> = path.split('/').collect();
        for (depth, segment) in segments.iter().enumerate() {
            let last = depth == segments.len() - 1;
            let index = match node.children.iter().position(|c| c.name == *segment) {
                Some(index) => index,
                None => {
                    node.children.push(Node::dir(segment));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
            if last {
                if kind == NodeKind::File && !node.children.is_empty() {
                    return Err(OverlayError::InvalidPath(format!(
                        "cannot bind a file over a populated directory: {path}"
                    )));
                }
                // Last writer wins at the producer slot.
                node.kind = kind;
                node.mode = mode;
                node.binding = Some(binding);
                return Ok(());
            }
            if node.kind == NodeKind::File {
                return Err(OverlayError::InvalidPath(format!(
                    "not a directory: {} (binding {path})",
                    node.name
                )));
            }
        }
        Ok(())
    }

    /// Find the node owning `path`: the exact node when it exists, else the
    /// deepest ancestor whose binding serves descendants.
    pub async fn resolve(&self, path: &str) -> Option<Resolved> {
        let root = self.root.read().await;
        if path == "." {
            return Some(Resolved {
                path: ".".to_string(),
                kind: root.kind,
                mode: root.mode,
                binding: root.binding.clone(),
                exact: true,
            });
        }

        let mut node: &Node = &root;
        let mut server: Option<(String, &Node)> = node
            .binding
            .as_ref()
            .is_some_and(Binding::serves_descendants)
            .then(|| (".".to_string(), node));
        let mut walked = String::new();

        for segment in path.split('/') {
            match node.child(segment) {
                Some(child) => {
                    if !walked.is_empty() {
                        walked.push('/');
                    }
                    walked.push_str(segment);
                    node = child;
                    if walked != path
                        && node
                            .binding
                            .as_ref()
                            .is_some_and(Binding::serves_descendants)
                    {
                        server = Some((walked.clone(), node));
                    }
                }
                None => {
                    return server.map(|(server_path, server_node)| Resolved {
                        path: server_path,
                        kind: server_node.kind,
                        mode: server_node.mode,
                        binding: server_node.binding.clone(),
                        exact: false,
                    });
                }
            }
        }

        Some(Resolved {
            path: path.to_string(),
            kind: node.kind,
            mode: node.mode,
            binding: node.binding.clone(),
            exact: true,
        })
    }

    /// Children of a directory node in insertion order; `None` when the
    /// path is not a directory node in the tree.
    pub async fn entries(&self, dir: &str) -> Option<Vec<DirEntry>> {
        let root = self.root.read().await;
        let mut node: &Node = &root;
        if dir != "." {
            for segment in dir.split('/') {
                node = node.child(segment)?;
            }
        }
        if node.kind != NodeKind::Dir {
            return None;
        }
        Some(
            node.children
                .iter()
                .map(|child| DirEntry {
                    name: child.name.clone(),
                    kind: match child.kind {
                        NodeKind::File => EntryKind::File,
                        NodeKind::Dir => EntryKind::Dir,
                    },
                    mode: child.mode,
                })
                .collect(),
        )
    }
}
