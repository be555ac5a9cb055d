//! The per-invocation filesystem handed to generators.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use graft_glob::Pattern;
use graft_vfs::DirEntry;

use crate::entry::VirtualEntry;
use crate::error::{OverlayError, Result};
use crate::linkmap::{LinkList, LinkOp};
use crate::overlay::Overlay;
use crate::path;

/// A read view of the overlay that records every observation as a
/// dependency of one generator target.
///
/// A fresh `ScopedFs` is constructed per generator invocation; its records
/// become the target's dependency ledger only if the generator succeeds.
pub struct ScopedFs {
    overlay: Overlay,
    links: Arc<LinkList>,
}

impl ScopedFs {
    pub(crate) fn new(overlay: Overlay, links: Arc<LinkList>) -> Self {
        Self { overlay, links }
    }

    /// Open a path through the overlay, recording an exact dependency.
    pub async fn open(&self, name: &str) -> Result<Arc<VirtualEntry>> {
        let name = path::clean(name)?;
        let entry = self.overlay.open(&name).await?;
        self.links.link(LinkOp::Open, &name);
        Ok(entry)
    }

    /// Read a file's bytes; a convenience over [`ScopedFs::open`].
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.open(name).await?;
        entry
            .data()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| OverlayError::InvalidPath(format!("is a directory: {name}")))
    }

    /// Whether a path currently resolves. Successful probes record an open
    /// dependency.
    pub async fn exists(&self, name: &str) -> bool {
        self.open(name).await.is_ok()
    }

    /// List a directory, recording a dependency on the directory and its
    /// direct children.
    pub async fn readdir(&self, name: &str) -> Result<Vec<DirEntry>> {
        let name = path::clean(name)?;
        let entries = self.overlay.readdir(&name).await?;
        let dir = name.clone();
        self.links.select(LinkOp::ReadDir, move |q| {
            q == dir.as_str() || path::dirname(q) == dir.as_str()
        });
        Ok(entries)
    }

    /// Glob the overlay, recording a dependency on every path the pattern
    /// could match.
    pub async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern)?;
        let matcher = pattern.clone();
        self.links
            .select(LinkOp::Glob, move |q| matcher.matches(q));
        self.overlay.glob_compiled(&pattern).await
    }

    /// Record an explicit dependency without reading anything.
    pub fn link(&self, to: &str) -> Result<()> {
        let to = path::clean(to)?;
        self.links.link(LinkOp::Link, &to);
        Ok(())
    }

    /// The ambient cancellation context. Generators doing long work should
    /// return promptly once it is cancelled.
    pub fn context(&self) -> CancellationToken {
        self.overlay.cancel_token()
    }

    /// Defer a hook until the overlay is closed. Hooks run in reverse
    /// registration order; repeated generator runs append again.
    pub fn defer(&self, hook: impl FnOnce() -> anyhow::Result<()> + Send + 'static) {
        self.overlay.push_deferred(hook);
    }
}
