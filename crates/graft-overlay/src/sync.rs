//! One-shot materialisation of the overlay into a writable filesystem.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use graft_vfs::Filesystem;

use crate::error::{OverlayError, Result};
use crate::overlay::Overlay;
use crate::path;
use crate::tree::NodeKind;

impl Overlay {
    /// Materialise every path under `dir` and copy the result into
    /// `writable` at the same location.
    ///
    /// The backing filesystem is wrapped in a throwaway
    /// [`CachedFs`](graft_vfs::CachedFs) for the duration so the flush
    /// touches each backing path once without
    /// polluting steady-state caches, and is restored afterwards. On
    /// failure the copy is partially committed: entries written before the
    /// error remain in `writable`.
    pub async fn sync(&self, writable: Arc<dyn Filesystem>, dir: &str) -> Result<()> {
        self.ensure_open()?;
        let dir = path::clean(dir)?;

        let original = self.wrap_backing_cached().await;
        let result = self.copy_out(writable.as_ref(), &dir).await;
        self.swap_backing(original).await;
        result
    }

    fn copy_out<'a>(
        &'a self,
        writable: &'a dyn Filesystem,
        name: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.kind_of(name).await? {
                NodeKind::Dir => {
                    writable
                        .mkdir(Path::new(name))
                        .await
                        .map_err(OverlayError::Backing)?;
                    for entry in self.readdir(name).await? {
                        self.copy_out(writable, &path::join(name, &entry.name)).await?;
                    }
                    Ok(())
                }
                NodeKind::File => {
                    let data = self.read(name).await?;
                    writable
                        .write(Path::new(name), &data)
                        .await
                        .map_err(OverlayError::Backing)?;
                    Ok(())
                }
            }
        })
    }
}
