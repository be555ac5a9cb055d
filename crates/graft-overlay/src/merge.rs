//! Union semantics for the tree and backing sides of the namespace.

use std::collections::HashSet;

use graft_vfs::DirEntry;

/// Merge a tree listing with a backing listing.
///
/// Tree entries come first in their insertion order and win on name
/// conflicts; backing entries follow in their own order.
pub(crate) fn union(tree: Vec<DirEntry>, backing: Vec<DirEntry>) -> Vec<DirEntry> {
    let mut seen: HashSet<String> = tree.iter().map(|e| e.name.clone()).collect();
    let mut merged = tree;
    for entry in backing {
        if seen.insert(entry.name.clone()) {
            merged.push(entry);
        }
    }
    merged
}
