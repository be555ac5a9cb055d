//! Deferred shutdown hooks.

use std::sync::Mutex;

type Hook = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Append-only list of shutdown hooks, drained once.
///
/// Generators register hooks via `ScopedFs::defer`; a generator that runs
/// multiple times appends each time. Hooks fire in reverse registration
/// order the first time the overlay is closed.
#[derive(Default)]
pub(crate) struct Closer {
    hooks: Mutex<Vec<Hook>>,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&self, hook: impl FnOnce() -> anyhow::Result<()> + Send + 'static) {
        self.hooks.lock().expect("closer lock").push(Box::new(hook));
    }

    /// Run all hooks LIFO, returning the first failure.
    pub fn close(&self) -> anyhow::Result<()> {
        let hooks = std::mem::take(&mut *self.hooks.lock().expect("closer lock"));
        let mut first_err = None;
        for hook in hooks.into_iter().rev() {
            if let Err(err) = hook()
                && first_err.is_none()
            {
                first_err = Some(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
