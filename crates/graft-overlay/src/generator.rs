//! Generator traits and the handles passed to them.
//!
//! A generator receives a [`ScopedFs`] that both serves reads and records
//! them as dependencies, plus a handle describing its target. File
//! generators fill in the handle's `data`; directory generators register
//! children through the handle.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use graft_vfs::Filesystem;

use crate::error::Result;
use crate::overlay::Overlay;
use crate::path;
use crate::scoped::ScopedFs;

/// Produces the contents of a single file.
#[async_trait]
pub trait FileGenerator: Send + Sync {
    async fn generate_file(&self, fs: &ScopedFs, file: &mut GeneratedFile) -> anyhow::Result<()>;
}

/// Populates a directory subtree on first access.
#[async_trait]
pub trait DirGenerator: Send + Sync {
    async fn generate_dir(&self, fs: &ScopedFs, dir: &GeneratedDir) -> anyhow::Result<()>;
}

/// Adapter so plain async closures can act as file generators.
pub(crate) struct FileFn<F>(pub F);

#[async_trait]
impl<F> FileGenerator for FileFn<F>
where
    F: for<'a> Fn(&'a ScopedFs, &'a mut GeneratedFile) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
{
    async fn generate_file(&self, fs: &ScopedFs, file: &mut GeneratedFile) -> anyhow::Result<()> {
        (self.0)(fs, file).await
    }
}

/// Adapter so plain async closures can act as directory generators.
pub(crate) struct DirFn<F>(pub F);

#[async_trait]
impl<F> DirGenerator for DirFn<F>
where
    F: for<'a> Fn(&'a ScopedFs, &'a GeneratedDir) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
{
    async fn generate_dir(&self, fs: &ScopedFs, dir: &GeneratedDir) -> anyhow::Result<()> {
        (self.0)(fs, dir).await
    }
}

/// A file generator serving fixed bytes, for embedding assets.
pub struct EmbedFile {
    pub data: Vec<u8>,
}

impl EmbedFile {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl FileGenerator for EmbedFile {
    async fn generate_file(&self, _fs: &ScopedFs, file: &mut GeneratedFile) -> anyhow::Result<()> {
        file.data = self.data.clone();
        Ok(())
    }
}

/// Handle describing the file a generator is producing.
///
/// `path` is where the generator is bound, `target` the path the caller
/// requested. They differ only for file servers.
pub struct GeneratedFile {
    /// The produced bytes; assign or append via [`GeneratedFile::write`].
    pub data: Vec<u8>,
    path: String,
    mode: u32,
    target: String,
}

impl GeneratedFile {
    pub(crate) fn new(path: &str, mode: u32, target: &str) -> Self {
        Self {
            data: Vec::new(),
            path: path.to_string(),
            mode,
            target: target.to_string(),
        }
    }

    /// The path this generator is bound at.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// The requested path that triggered this generator.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target relative to the bound path; `"."` when they are equal.
    pub fn relative(&self) -> String {
        path::relative(&self.path, &self.target)
    }

    /// Append bytes to the produced contents.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

/// Handle describing the directory a generator is populating.
///
/// Registration goes through the same overlay namespace, so children bound
/// here are visible to every other generator.
pub struct GeneratedDir {
    overlay: Overlay,
    path: String,
    mode: u32,
    target: String,
}

impl GeneratedDir {
    pub(crate) fn new(overlay: Overlay, path: &str, mode: u32, target: &str) -> Self {
        Self {
            overlay,
            path: path.to_string(),
            mode,
            target: target.to_string(),
        }
    }

    /// The directory path this generator is bound at.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// The requested path that triggered this generator.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target relative to the bound path; `"."` when they are equal.
    pub fn relative(&self) -> String {
        path::relative(&self.path, &self.target)
    }

    /// Register a file generator below this directory.
    pub async fn generate_file<F>(&self, rel: &str, generate: F) -> Result<()>
    where
        F: for<'a> Fn(&'a ScopedFs, &'a mut GeneratedFile) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.file_generator(rel, FileFn(generate)).await
    }

    /// Register a [`FileGenerator`] below this directory.
    pub async fn file_generator(
        &self,
        rel: &str,
        generator: impl FileGenerator + 'static,
    ) -> Result<()> {
        let at = path::join(&self.path, &path::clean(rel)?);
        self.overlay
            .bind_file_generator(&at, Arc::new(generator))
            .await
    }

    /// Register a directory generator below this directory.
    pub async fn generate_dir<F>(&self, rel: &str, generate: F) -> Result<()>
    where
        F: for<'a> Fn(&'a ScopedFs, &'a GeneratedDir) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.dir_generator(rel, DirFn(generate)).await
    }

    /// Register a [`DirGenerator`] below this directory.
    pub async fn dir_generator(
        &self,
        rel: &str,
        generator: impl DirGenerator + 'static,
    ) -> Result<()> {
        let at = path::join(&self.path, &path::clean(rel)?);
        self.overlay
            .bind_dir_generator(&at, Arc::new(generator))
            .await
    }

    /// Register a per-target file server below this directory.
    pub async fn serve_file<F>(&self, rel: &str, serve: F) -> Result<()>
    where
        F: for<'a> Fn(&'a ScopedFs, &'a mut GeneratedFile) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.file_server(rel, FileFn(serve)).await
    }

    /// Register a [`FileGenerator`] as a per-target file server.
    pub async fn file_server(
        &self,
        rel: &str,
        generator: impl FileGenerator + 'static,
    ) -> Result<()> {
        let at = path::join(&self.path, &path::clean(rel)?);
        self.overlay
            .bind_file_server(&at, Arc::new(generator))
            .await
    }

    /// Mount a foreign read-only filesystem at this directory.
    pub async fn mount(&self, fs: Arc<dyn Filesystem>) -> Result<()> {
        self.overlay.bind_mount(&self.path, fs).await
    }
}
