//! graft-overlay: a generative virtual filesystem overlay.
//!
//! The overlay composes a mutable tree of lazily-materialised generated
//! files with a real backing filesystem under one path-addressed,
//! read-only namespace. Generator output is memoised per target with
//! single-flight execution; the filesystem operations each generator
//! performs (open, readdir, glob, explicit link) are recorded implicitly,
//! and [`Overlay::change`] evicts the transitive closure of affected
//! entries when inputs move.
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::FutureExt;
//! use graft_overlay::Overlay;
//! use graft_overlay::vfs::MemoryFs;
//!
//! # async fn demo() -> graft_overlay::Result<()> {
//! let overlay = Overlay::new(Arc::new(MemoryFs::new()));
//! overlay
//!     .generate_file("hello.txt", |_fs, file| {
//!         async move {
//!             file.data = b"hello".to_vec();
//!             Ok(())
//!         }
//!         .boxed()
//!     })
//!     .await?;
//! let bytes = overlay.read("hello.txt").await?;
//! assert_eq!(bytes, b"hello");
//! # Ok(())
//! # }
//! ```

mod cache;
mod closer;
mod entry;
mod error;
mod generator;
mod linkmap;
mod merge;
mod overlay;
pub mod path;
mod scoped;
mod sync;
mod tree;

pub use entry::VirtualEntry;
pub use error::{OverlayError, Result};
pub use generator::{DirGenerator, EmbedFile, FileGenerator, GeneratedDir, GeneratedFile};
pub use linkmap::LinkOp;
pub use overlay::Overlay;
pub use scoped::ScopedFs;

// Re-export the sibling crates the public API is expressed in.
pub use graft_glob as glob;
pub use graft_vfs as vfs;
