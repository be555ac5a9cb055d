//! Materialised virtual entries.

use graft_vfs::DirEntry;

/// A materialised file or directory produced by a generator, a mount, or
/// the backing filesystem.
///
/// Entries are immutable once built; the cache hands out shared references.
#[derive(Debug, Clone)]
pub enum VirtualEntry {
    File {
        path: String,
        mode: u32,
        data: Vec<u8>,
    },
    Dir {
        path: String,
        mode: u32,
        entries: Vec<DirEntry>,
    },
}

impl VirtualEntry {
    /// The overlay path this entry was materialised for.
    pub fn path(&self) -> &str {
        match self {
            VirtualEntry::File { path, .. } | VirtualEntry::Dir { path, .. } => path,
        }
    }

    pub fn mode(&self) -> u32 {
        match self {
            VirtualEntry::File { mode, .. } | VirtualEntry::Dir { mode, .. } => *mode,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, VirtualEntry::Dir { .. })
    }

    /// File contents; `None` for directories.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            VirtualEntry::File { data, .. } => Some(data),
            VirtualEntry::Dir { .. } => None,
        }
    }

    /// Child listing; `None` for files.
    pub fn entries(&self) -> Option<&[DirEntry]> {
        match self {
            VirtualEntry::File { .. } => None,
            VirtualEntry::Dir { entries, .. } => Some(entries),
        }
    }
}
