//! The overlay: a read-only view composing the generator tree with a
//! backing filesystem.
//!
//! Reads consult the tree first and fall back to the backing store for
//! paths the tree does not serve. Generator output is memoised per target;
//! the dependencies each generator consulted are recorded so `change` can
//! evict exactly the affected entries.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use graft_glob::Pattern;
use graft_vfs::{CachedFs, DirEntry, Filesystem};

use crate::cache::Cache;
use crate::closer::Closer;
use crate::entry::VirtualEntry;
use crate::error::{OverlayError, Result};
use crate::generator::{
    DirFn, DirGenerator, FileFn, FileGenerator, GeneratedDir, GeneratedFile,
};
use crate::linkmap::LinkMap;
use crate::merge;
use crate::path;
use crate::scoped::ScopedFs;
use crate::tree::{Binding, NodeKind, Resolved, Tree};

/// The composed read-only filesystem view.
///
/// Cheap to clone; clones share all state. The overlay lives for the
/// process: registration builds the tree, reads materialise entries, and
/// `change` invalidates them when inputs move.
#[derive(Clone)]
pub struct Overlay {
    inner: Arc<Inner>,
}

struct Inner {
    tree: Tree,
    cache: Cache,
    lmap: LinkMap,
    backing: RwLock<Arc<dyn Filesystem>>,
    /// Per-target gates enforcing single-flight materialisation.
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serialises change sweeps against each other.
    sweep: Mutex<()>,
    closer: Closer,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Overlay {
    /// Create an overlay over a backing filesystem.
    pub fn new(backing: Arc<dyn Filesystem>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tree: Tree::new(),
                cache: Cache::new(),
                lmap: LinkMap::new(),
                backing: RwLock::new(backing),
                gates: Mutex::new(HashMap::new()),
                sweep: Mutex::new(()),
                closer: Closer::new(),
                cancel: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Bind an async closure that generates one file at `target`.
    pub async fn generate_file<F>(&self, target: &str, generate: F) -> Result<()>
    where
        F: for<'a> Fn(&'a ScopedFs, &'a mut GeneratedFile) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.file_generator(target, FileFn(generate)).await
    }

    /// Bind a [`FileGenerator`] at `target`.
    pub async fn file_generator(
        &self,
        target: &str,
        generator: impl FileGenerator + 'static,
    ) -> Result<()> {
        let target = path::clean(target)?;
        self.bind_file_generator(&target, Arc::new(generator)).await
    }

    /// Bind an async closure that populates the directory `dir` on first
    /// access.
    pub async fn generate_dir<F>(&self, dir: &str, generate: F) -> Result<()>
    where
        F: for<'a> Fn(&'a ScopedFs, &'a GeneratedDir) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.dir_generator(dir, DirFn(generate)).await
    }

    /// Bind a [`DirGenerator`] at `dir`.
    pub async fn dir_generator(
        &self,
        dir: &str,
        generator: impl DirGenerator + 'static,
    ) -> Result<()> {
        let dir = path::clean(dir)?;
        self.bind_dir_generator(&dir, Arc::new(generator)).await
    }

    /// Bind an async closure that serves a file for every descendant of
    /// `dir` on demand.
    pub async fn serve_file<F>(&self, dir: &str, serve: F) -> Result<()>
    where
        F: for<'a> Fn(&'a ScopedFs, &'a mut GeneratedFile) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.file_server(dir, FileFn(serve)).await
    }

    /// Bind a [`FileGenerator`] as a per-target server under `dir`.
    pub async fn file_server(
        &self,
        dir: &str,
        generator: impl FileGenerator + 'static,
    ) -> Result<()> {
        let dir = path::clean(dir)?;
        self.bind_file_server(&dir, Arc::new(generator)).await
    }

    /// Mount a foreign read-only filesystem so its top-level entries
    /// appear under `dir`. Descendants resolve lazily against the mount.
    pub async fn mount(&self, dir: &str, fs: Arc<dyn Filesystem>) -> Result<()> {
        let dir = path::clean(dir)?;
        self.bind_mount(&dir, fs).await
    }

    pub(crate) async fn bind_file_generator(
        &self,
        at: &str,
        generator: Arc<dyn FileGenerator>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.inner.tree.bind_file(at, Binding::File(generator)).await?;
        // Rebinding a producer invalidates whatever the old one produced.
        self.inner.cache.delete(at);
        Ok(())
    }

    pub(crate) async fn bind_dir_generator(
        &self,
        at: &str,
        generator: Arc<dyn DirGenerator>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.inner.tree.bind_dir(at, Binding::Dir(generator)).await?;
        self.inner.cache.delete(at);
        Ok(())
    }

    pub(crate) async fn bind_file_server(
        &self,
        at: &str,
        generator: Arc<dyn FileGenerator>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .tree
            .bind_dir(at, Binding::Server(generator))
            .await?;
        self.inner.cache.delete(at);
        Ok(())
    }

    pub(crate) async fn bind_mount(&self, dir: &str, fs: Arc<dyn Filesystem>) -> Result<()> {
        self.ensure_open()?;
        let entries = fs
            .list(Path::new("."))
            .await
            .map_err(|e| OverlayError::backing(dir, e))?;
        // Bind each top-level entry so a mount can overlap an existing
        // directory; descendants resolve lazily through the mount node.
        for entry in entries {
            let at = path::join(dir, &entry.name);
            let binding = Binding::Mount {
                fs: fs.clone(),
                dir: dir.to_string(),
            };
            if entry.is_dir() {
                self.inner.tree.bind_dir(&at, binding).await?;
            } else {
                self.inner.tree.bind_file(&at, binding).await?;
            }
            self.inner.cache.delete(&at);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read interface
    // ------------------------------------------------------------------

    /// Open a path, materialising it if a generator serves it.
    pub async fn open(&self, name: &str) -> Result<Arc<VirtualEntry>> {
        self.ensure_open()?;
        let name = path::clean(name)?;
        self.open_entry(&name).await
    }

    /// Read a file's bytes.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.open(name).await?;
        entry
            .data()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| OverlayError::InvalidPath(format!("is a directory: {name}")))
    }

    /// List a directory: the union of tree and backing entries, tree
    /// entries first and winning on name conflicts.
    pub async fn readdir(&self, name: &str) -> Result<Vec<DirEntry>> {
        self.ensure_open()?;
        let name = path::clean(name)?;
        let tree_side = self.tree_entries(&name).await?;
        let backing = self.backing().await;
        match backing.list(Path::new(&name)).await {
            Ok(backing_entries) => Ok(match tree_side {
                Some(tree_entries) => merge::union(tree_entries, backing_entries),
                None => backing_entries,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tree_side.ok_or(OverlayError::NotFound(name))
            }
            Err(err) => Err(OverlayError::Backing(err)),
        }
    }

    /// Match a glob pattern against the overlay namespace.
    pub async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let pattern = Pattern::new(pattern)?;
        self.glob_compiled(&pattern).await
    }

    /// Walk a subtree depth-first, returning every path in deterministic
    /// order (the root first, then each directory's listing order).
    pub async fn walk(&self, root: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let root = path::clean(root)?;
        self.walk_collect(&root).await
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Invalidate the given input paths and, transitively, every cached
    /// generated entry whose recorded dependencies match.
    ///
    /// The work list is processed by index and appended to as matches are
    /// found, sweeping to a fixed point. Cycles are benign: an evicted
    /// entry no longer has a cache entry, so it is not re-queued.
    pub async fn change<I, S>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_open()?;
        let _sweep = self.inner.sweep.lock().await;

        let mut work = Vec::new();
        for p in paths {
            work.push(path::clean(p.as_ref())?);
        }

        let mut index = 0;
        while index < work.len() {
            let changed = work[index].clone();
            if self.inner.cache.has(&changed) {
                tracing::debug!(path = %changed, "graft: cache evict");
                self.inner.cache.delete(&changed);
            }
            let mut queued = Vec::new();
            self.inner.lmap.range(|generated, list| {
                if self.inner.cache.has(generated) && list.check(&changed) {
                    queued.push(generated.to_string());
                }
                true
            });
            work.extend(queued);
            index += 1;
        }
        Ok(())
    }

    /// Close the overlay: cancel the ambient context and drain deferred
    /// hooks in reverse registration order. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.cancel.cancel();
        self.inner.closer.close().map_err(OverlayError::Close)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(OverlayError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub(crate) fn push_deferred(
        &self,
        hook: impl FnOnce() -> anyhow::Result<()> + Send + 'static,
    ) {
        self.inner.closer.defer(hook);
    }

    pub(crate) async fn swap_backing(&self, fs: Arc<dyn Filesystem>) -> Arc<dyn Filesystem> {
        let mut backing = self.inner.backing.write().await;
        std::mem::replace(&mut *backing, fs)
    }

    /// Replace the backing filesystem with a read-memoising wrapper around
    /// itself, returning the original for later restoration.
    pub(crate) async fn wrap_backing_cached(&self) -> Arc<dyn Filesystem> {
        let mut backing = self.inner.backing.write().await;
        let original = backing.clone();
        *backing = Arc::new(CachedFs::new(original.clone()));
        original
    }

    async fn backing(&self) -> Arc<dyn Filesystem> {
        self.inner.backing.read().await.clone()
    }

    /// Per-target mutex enforcing single-flight materialisation. Gates are
    /// kept for the overlay's lifetime; the population is bounded by the
    /// set of generated targets.
    async fn gate(&self, target: &str) -> Arc<Mutex<()>> {
        let mut gates = self.inner.gates.lock().await;
        gates.entry(target.to_string()).or_default().clone()
    }

    fn open_entry<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Arc<VirtualEntry>>> {
        Box::pin(async move {
            match self.inner.tree.resolve(name).await {
                Some(resolved) => self.open_resolved(name, resolved).await,
                None => self.open_backing(name).await,
            }
        })
    }

    fn open_resolved<'a>(
        &'a self,
        name: &'a str,
        resolved: Resolved,
    ) -> BoxFuture<'a, Result<Arc<VirtualEntry>>> {
        Box::pin(async move {
            match resolved.binding.clone() {
                Some(Binding::File(generator)) => {
                    self.run_file_generator(name, &resolved, generator).await
                }
                Some(Binding::Server(generator)) => {
                    if resolved.exact {
                        // The server's own directory is not a servable target.
                        return Err(OverlayError::InvalidPath(format!(
                            "file server cannot serve its own directory: {name}"
                        )));
                    }
                    self.run_file_server(name, &resolved, generator).await
                }
                Some(Binding::Dir(generator)) => {
                    self.materialize_dir(name, &resolved, generator).await?;
                    if resolved.exact {
                        if let Some(entry) = self.inner.cache.get(&resolved.path) {
                            return Ok(entry);
                        }
                        // A sweep may have evicted the fresh entry; the tree
                        // the callback populated still answers.
                        let entries =
                            self.inner.tree.entries(&resolved.path).await.unwrap_or_default();
                        Ok(Arc::new(VirtualEntry::Dir {
                            path: resolved.path.clone(),
                            mode: resolved.mode,
                            entries,
                        }))
                    } else {
                        // The callback may have registered the requested
                        // descendant; resolve again against the populated
                        // tree.
                        match self.inner.tree.resolve(name).await {
                            Some(again) if again.exact || again.path != resolved.path => {
                                self.open_resolved(name, again).await
                            }
                            _ => Err(OverlayError::NotFound(name.to_string())),
                        }
                    }
                }
                Some(Binding::Mount { fs, dir }) => self.open_mounted(name, &fs, &dir).await,
                None => {
                    if resolved.kind == NodeKind::Dir {
                        if let Some(entries) = self.inner.tree.entries(name).await
                            && !entries.is_empty()
                        {
                            return Ok(Arc::new(VirtualEntry::Dir {
                                path: name.to_string(),
                                mode: resolved.mode,
                                entries,
                            }));
                        }
                        // An empty producer-less directory defers to the
                        // backing filesystem.
                        return self.open_backing(name).await;
                    }
                    Err(OverlayError::InvalidPath(format!(
                        "unreadable file: {name}"
                    )))
                }
            }
        })
    }

    async fn run_file_generator(
        &self,
        target: &str,
        resolved: &Resolved,
        generator: Arc<dyn FileGenerator>,
    ) -> Result<Arc<VirtualEntry>> {
        if let Some(entry) = self.inner.cache.get(target) {
            return Ok(entry);
        }
        let gate = self.gate(target).await;
        let _guard = gate.lock().await;
        if let Some(entry) = self.inner.cache.get(target) {
            return Ok(entry);
        }

        let links = self.inner.lmap.scope();
        let scoped = ScopedFs::new(self.clone(), links.clone());
        let mut file = GeneratedFile::new(&resolved.path, resolved.mode, target);
        tracing::debug!(path = %target, "graft: running file generator");
        generator
            .generate_file(&scoped, &mut file)
            .await
            .map_err(|source| OverlayError::Generator {
                path: target.to_string(),
                source,
            })?;

        let entry = Arc::new(VirtualEntry::File {
            path: resolved.path.clone(),
            mode: resolved.mode,
            data: file.data,
        });
        // The ledger lands before the cache entry so a sweep that sees the
        // entry always sees its dependencies.
        self.inner.lmap.commit(target, links);
        self.inner.cache.set(target, entry.clone());
        Ok(entry)
    }

    async fn run_file_server(
        &self,
        target: &str,
        resolved: &Resolved,
        generator: Arc<dyn FileGenerator>,
    ) -> Result<Arc<VirtualEntry>> {
        if let Some(entry) = self.inner.cache.get(target) {
            return Ok(entry);
        }
        let gate = self.gate(target).await;
        let _guard = gate.lock().await;
        if let Some(entry) = self.inner.cache.get(target) {
            return Ok(entry);
        }

        let links = self.inner.lmap.scope();
        let scoped = ScopedFs::new(self.clone(), links.clone());
        // The node is the server directory; the virtual file takes the
        // requested target path.
        let mut file = GeneratedFile::new(&resolved.path, resolved.mode, target);
        tracing::debug!(path = %resolved.path, requested = %target, "graft: running file server");
        generator
            .generate_file(&scoped, &mut file)
            .await
            .map_err(|source| OverlayError::Generator {
                path: target.to_string(),
                source,
            })?;

        let entry = Arc::new(VirtualEntry::File {
            path: target.to_string(),
            mode: 0,
            data: file.data,
        });
        self.inner.lmap.commit(target, links);
        self.inner.cache.set(target, entry.clone());
        Ok(entry)
    }

    /// Run a directory generator once, caching under the node's own path.
    ///
    /// Subsequent descendant lookups see the directory as materialised and
    /// resolve directly against the tree the callback populated.
    async fn materialize_dir(
        &self,
        target: &str,
        resolved: &Resolved,
        generator: Arc<dyn DirGenerator>,
    ) -> Result<()> {
        if self.inner.cache.has(&resolved.path) {
            return Ok(());
        }
        let gate = self.gate(&resolved.path).await;
        let _guard = gate.lock().await;
        if self.inner.cache.has(&resolved.path) {
            return Ok(());
        }

        let links = self.inner.lmap.scope();
        let scoped = ScopedFs::new(self.clone(), links.clone());
        let dir = GeneratedDir::new(self.clone(), &resolved.path, resolved.mode, target);
        tracing::debug!(path = %resolved.path, requested = %target, "graft: running dir generator");
        generator
            .generate_dir(&scoped, &dir)
            .await
            .map_err(|source| OverlayError::Generator {
                path: resolved.path.clone(),
                source,
            })?;

        let entries = self.inner.tree.entries(&resolved.path).await.unwrap_or_default();
        let entry = Arc::new(VirtualEntry::Dir {
            path: resolved.path.clone(),
            mode: resolved.mode,
            entries,
        });
        self.inner.lmap.commit(&resolved.path, links);
        self.inner.cache.set(&resolved.path, entry);
        Ok(())
    }

    async fn open_mounted(
        &self,
        name: &str,
        fs: &Arc<dyn Filesystem>,
        dir: &str,
    ) -> Result<Arc<VirtualEntry>> {
        let rel = path::relative(dir, name);
        let meta = fs
            .stat(Path::new(&rel))
            .await
            .map_err(|e| OverlayError::backing(name, e))?;
        if meta.is_dir {
            let entries = fs
                .list(Path::new(&rel))
                .await
                .map_err(|e| OverlayError::backing(name, e))?;
            Ok(Arc::new(VirtualEntry::Dir {
                path: name.to_string(),
                mode: meta.mode,
                entries,
            }))
        } else {
            let data = fs
                .read(Path::new(&rel))
                .await
                .map_err(|e| OverlayError::backing(name, e))?;
            Ok(Arc::new(VirtualEntry::File {
                path: name.to_string(),
                mode: meta.mode,
                data,
            }))
        }
    }

    async fn open_backing(&self, name: &str) -> Result<Arc<VirtualEntry>> {
        let backing = self.backing().await;
        let meta = backing
            .stat(Path::new(name))
            .await
            .map_err(|e| OverlayError::backing(name, e))?;
        if meta.is_dir {
            let entries = backing
                .list(Path::new(name))
                .await
                .map_err(|e| OverlayError::backing(name, e))?;
            Ok(Arc::new(VirtualEntry::Dir {
                path: name.to_string(),
                mode: meta.mode,
                entries,
            }))
        } else {
            let data = backing
                .read(Path::new(name))
                .await
                .map_err(|e| OverlayError::backing(name, e))?;
            Ok(Arc::new(VirtualEntry::File {
                path: name.to_string(),
                mode: meta.mode,
                data,
            }))
        }
    }

    /// Tree-side entries for `readdir`; `None` when the tree does not own
    /// the path and the backing filesystem should answer alone.
    fn tree_entries<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<DirEntry>>>> {
        Box::pin(async move {
            let Some(resolved) = self.inner.tree.resolve(name).await else {
                return Ok(None);
            };
            if resolved.exact && resolved.kind == NodeKind::File {
                return Err(OverlayError::InvalidPath(format!(
                    "not a directory: {name}"
                )));
            }
            match resolved.binding.clone() {
                Some(Binding::Dir(generator)) => {
                    self.materialize_dir(name, &resolved, generator).await?;
                    if resolved.exact {
                        Ok(self.inner.tree.entries(name).await)
                    } else {
                        match self.inner.tree.resolve(name).await {
                            Some(again) if again.exact || again.path != resolved.path => {
                                self.tree_entries(name).await
                            }
                            _ => Ok(None),
                        }
                    }
                }
                Some(Binding::Mount { fs, dir }) => {
                    let rel = path::relative(&dir, name);
                    match fs.list(Path::new(&rel)).await {
                        Ok(entries) => Ok(Some(entries)),
                        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                        Err(err) => Err(OverlayError::Backing(err)),
                    }
                }
                Some(Binding::Server(_)) | None => {
                    if resolved.exact {
                        Ok(self.inner.tree.entries(name).await)
                    } else {
                        Ok(None)
                    }
                }
                Some(Binding::File(_)) => Ok(None),
            }
        })
    }

    pub(crate) async fn glob_compiled(&self, pattern: &Pattern) -> Result<Vec<String>> {
        let mut matches = Vec::new();
        for base in pattern.bases() {
            let paths = match self.walk_collect(&base).await {
                Ok(paths) => paths,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            matches.extend(paths.into_iter().filter(|p| pattern.matches(p)));
        }
        // First-seen dedupe across overlapping bases.
        let mut seen = HashSet::new();
        matches.retain(|p| seen.insert(p.clone()));
        Ok(matches)
    }

    fn walk_collect<'a>(&'a self, root: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            match self.kind_of(root).await? {
                NodeKind::File => Ok(vec![root.to_string()]),
                NodeKind::Dir => {
                    let mut out = vec![root.to_string()];
                    for entry in self.readdir(root).await? {
                        let child = path::join(root, &entry.name);
                        if entry.is_dir() {
                            out.extend(self.walk_collect(&child).await?);
                        } else {
                            out.push(child);
                        }
                    }
                    Ok(out)
                }
            }
        })
    }

    /// Classify a path as file or directory without materialising file
    /// generators.
    pub(crate) fn kind_of<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<NodeKind>> {
        Box::pin(async move {
            match self.inner.tree.resolve(name).await {
                Some(resolved) if resolved.exact => Ok(resolved.kind),
                Some(resolved) => match resolved.binding.clone() {
                    Some(Binding::Server(_)) => Ok(NodeKind::File),
                    Some(Binding::Mount { fs, dir }) => {
                        let rel = path::relative(&dir, name);
                        let meta = fs
                            .stat(Path::new(&rel))
                            .await
                            .map_err(|e| OverlayError::backing(name, e))?;
                        Ok(if meta.is_dir {
                            NodeKind::Dir
                        } else {
                            NodeKind::File
                        })
                    }
                    Some(Binding::Dir(generator)) => {
                        self.materialize_dir(name, &resolved, generator).await?;
                        match self.inner.tree.resolve(name).await {
                            Some(again) if again.exact => Ok(again.kind),
                            Some(again) if again.path != resolved.path => {
                                self.kind_of(name).await
                            }
                            _ => Err(OverlayError::NotFound(name.to_string())),
                        }
                    }
                    _ => Err(OverlayError::NotFound(name.to_string())),
                },
                None => {
                    let backing = self.backing().await;
                    let meta = backing
                        .stat(Path::new(name))
                        .await
                        .map_err(|e| OverlayError::backing(name, e))?;
                    Ok(if meta.is_dir {
                        NodeKind::Dir
                    } else {
                        NodeKind::File
                    })
                }
            }
        })
    }
}
