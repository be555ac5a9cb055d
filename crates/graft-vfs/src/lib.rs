//! graft-vfs: filesystem abstraction for the graft overlay.
//!
//! Provides:
//! - **Filesystem**: the async trait every backing store implements
//! - **MemoryFs**: in-memory tree, used in tests and as a sync target
//! - **LocalFs**: real filesystem access rooted at a directory
//! - **CachedFs**: read-memoising decorator over another filesystem
//!
//! All operations use slash-separated paths relative to the filesystem
//! root. Errors distinguish not-found (`io::ErrorKind::NotFound`) from
//! other I/O failure; read-only backends reject writes with
//! `io::ErrorKind::PermissionDenied`.

mod cached;
mod entry;
mod local;
mod memory;
mod traits;

pub use cached::CachedFs;
pub use entry::{DirEntry, EntryKind, MODE_DIR, MODE_FILE, Metadata};
pub use local::LocalFs;
pub use memory::MemoryFs;
pub use traits::Filesystem;
