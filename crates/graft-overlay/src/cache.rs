//! Concurrent cache of materialised entries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::entry::VirtualEntry;

/// Maps overlay paths to materialised entries.
///
/// Read-dominant; lookups take a shared lock, mutation an exclusive one.
/// The critical sections are plain map operations, so a blocking lock is
/// used even from async callers. The cache does not deduplicate concurrent
/// producers; the overlay's per-target gates do.
#[derive(Default)]
pub(crate) struct Cache {
    entries: RwLock<HashMap<String, Arc<VirtualEntry>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<VirtualEntry>> {
        self.entries.read().expect("cache lock").get(path).cloned()
    }

    pub fn has(&self, path: &str) -> bool {
        self.entries.read().expect("cache lock").contains_key(path)
    }

    pub fn set(&self, path: &str, entry: Arc<VirtualEntry>) {
        self.entries
            .write()
            .expect("cache lock")
            .insert(path.to_string(), entry);
    }

    pub fn delete(&self, path: &str) {
        self.entries.write().expect("cache lock").remove(path);
    }
}
