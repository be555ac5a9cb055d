//! Per-generated-path dependency ledger.
//!
//! While a generator runs, every filesystem observation it makes is
//! appended to a [`LinkList`] scoped to its target. When an input path
//! changes, [`LinkList::check`] answers whether the generated path depended
//! on it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The operation that produced a link record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
    Open,
    Link,
    ReadDir,
    Glob,
}

impl fmt::Display for LinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkOp::Open => "open",
            LinkOp::Link => "link",
            LinkOp::ReadDir => "readdir",
            LinkOp::Glob => "glob",
        };
        f.write_str(name)
    }
}

/// A single recorded dependency.
///
/// `Exact` keeps invalidation cheap for the common open/link case (string
/// equality); predicates are reserved for readdir and glob.
pub(crate) enum LinkRecord {
    Exact {
        op: LinkOp,
        path: String,
    },
    Predicate {
        op: LinkOp,
        accepts: Box<dyn Fn(&str) -> bool + Send + Sync>,
    },
}

impl LinkRecord {
    fn accepts(&self, changed: &str) -> bool {
        match self {
            LinkRecord::Exact { path, .. } => path == changed,
            LinkRecord::Predicate { accepts, .. } => accepts(changed),
        }
    }
}

impl fmt::Debug for LinkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkRecord::Exact { op, path } => write!(f, "Exact({op} {path})"),
            LinkRecord::Predicate { op, .. } => write!(f, "Predicate({op})"),
        }
    }
}

/// Append-only list of dependencies recorded during one generator run.
#[derive(Default)]
pub(crate) struct LinkList {
    records: Mutex<Vec<LinkRecord>>,
}

impl LinkList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record an exact dependency.
    pub fn link(&self, op: LinkOp, path: &str) {
        self.records.lock().expect("linkmap lock").push(LinkRecord::Exact {
            op,
            path: path.to_string(),
        });
    }

    /// Record a predicate dependency.
    pub fn select(&self, op: LinkOp, accepts: impl Fn(&str) -> bool + Send + Sync + 'static) {
        self.records
            .lock()
            .expect("linkmap lock")
            .push(LinkRecord::Predicate {
                op,
                accepts: Box::new(accepts),
            });
    }

    /// True iff any record accepts the changed path. Short-circuits on the
    /// first match; the list is held stable for the duration.
    pub fn check(&self, changed: &str) -> bool {
        self.records
            .lock()
            .expect("linkmap lock")
            .iter()
            .any(|record| record.accepts(changed))
    }

}

/// Mapping from generated path to its dependency list.
///
/// Generators record into a detached list created by [`LinkMap::scope`];
/// the overlay commits it with [`LinkMap::commit`] only when the generator
/// succeeds, so a failed run never replaces a prior ledger.
#[derive(Default)]
pub(crate) struct LinkMap {
    lists: Mutex<HashMap<String, Arc<LinkList>>>,
}

impl LinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, detached list for one generator run.
    pub fn scope(&self) -> Arc<LinkList> {
        LinkList::new()
    }

    /// Install the list recorded for `target`, replacing any prior one
    /// wholesale.
    pub fn commit(&self, target: &str, list: Arc<LinkList>) {
        self.lists
            .lock()
            .expect("linkmap lock")
            .insert(target.to_string(), list);
    }

    /// Visit `(generated-path, list)` pairs in unspecified order until the
    /// callback returns false.
    ///
    /// Iterates over a snapshot so callbacks may re-enter the map.
    pub fn range(&self, mut f: impl FnMut(&str, &Arc<LinkList>) -> bool) {
        let snapshot: Vec<(String, Arc<LinkList>)> = self
            .lists
            .lock()
            .expect("linkmap lock")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (path, list) in &snapshot {
            if !f(path, list) {
                break;
            }
        }
    }
}
