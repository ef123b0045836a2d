#![forbid(unsafe_code)]

//! Teardown bookkeeping.

use std::cell::{Cell, RefCell};
use std::fmt;

type Teardown = Box<dyn FnOnce()>;

/// Collects teardown callbacks and runs each exactly once.
///
/// `dispose` drains the list, so a second call is a no-op. Callbacks added
/// after disposal run immediately.
#[derive(Default)]
pub struct Disposer {
    disposed: Cell<bool>,
    callbacks: RefCell<Vec<Teardown>>,
}

impl Disposer {
    /// Create an empty disposer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a teardown callback.
    pub fn add(&self, teardown: impl FnOnce() + 'static) {
        if self.disposed.get() {
            teardown();
            return;
        }
        self.callbacks.borrow_mut().push(Box::new(teardown));
    }

    /// Run every registered callback, in registration order.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        for teardown in callbacks {
            teardown();
        }
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.disposed.get())
            .field("pending", &self.callbacks.borrow().len())
            .finish()
    }
}
