#![forbid(unsafe_code)]

//! A settle-delayed read projection of another state.
//!
//! The UI binds to the source for immediate feedback; the rest of the
//! application reads a [`DebouncedState`] so it only sees values that held
//! still for `delay`. Writes go straight to the source.
//!
//! # Settling
//!
//! The wrapper compares the source's [`changed_at`](Validatable::changed_at)
//! against the clock. Once the source value has been unchanged for `delay`,
//! reads pass through and refresh a snapshot. While the value is in flux,
//! reads return that snapshot.
//!
//! A local watcher task subscribes to the source. It refreshes the snapshot
//! at each settle moment and on every source change while settled, so the
//! snapshot is the last settled state rather than the last observed one. A
//! settled, idle wrapper sleeps on the subscription with no timer armed.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::DEFAULT_DELAY;
use crate::disposable::Disposer;
use crate::field::FieldState;
use crate::shared::Listeners;
use crate::state::{DisablePredicate, State, Validatable, ValidateResult, ValidateStatus};
use crate::validation::Validator;

#[derive(Clone, PartialEq)]
struct Snapshot<V> {
    value: V,
    touched: bool,
    activated: bool,
    status: ValidateStatus,
    error: Option<String>,
    own_error: Option<String>,
}

/// Wraps a state and exposes its settled view.
pub struct DebouncedState<S: State> {
    inner: Rc<DebouncedInner<S>>,
}

struct DebouncedInner<S: State> {
    source: S,
    delay: Duration,
    snapshot: RefCell<Snapshot<S::Value>>,
    watcher: RefCell<Option<JoinHandle<()>>>,
    listeners: Listeners,
    disposer: Disposer,
}

impl<S: State> DebouncedState<S> {
    /// Wrap `source` with the default delay.
    ///
    /// # Panics
    ///
    /// Spawns the watcher with `tokio::task::spawn_local`, so this must be
    /// called inside a `LocalSet`.
    pub fn new(source: S) -> Self {
        Self::with_delay(source, DEFAULT_DELAY)
    }

    /// Wrap `source` with a custom delay.
    ///
    /// # Panics
    ///
    /// Same as [`new`](Self::new).
    pub fn with_delay(source: S, delay: Duration) -> Self {
        let snapshot = RefCell::new(Snapshot::of(&source));
        // Held by the watcher; the source only keeps a weak reference.
        let changes = Rc::new(Notify::new());
        source.subscribe(&changes);
        let inner = Rc::new(DebouncedInner {
            source,
            delay,
            snapshot,
            watcher: RefCell::new(None),
            listeners: Listeners::default(),
            disposer: Disposer::new(),
        });
        let watcher = tokio::task::spawn_local(watch(Rc::downgrade(&inner), changes));
        inner.watcher.replace(Some(watcher));
        let weak = Rc::downgrade(&inner);
        inner.disposer.add(move || {
            if let Some(inner) = weak.upgrade() {
                inner.stop_watcher();
            }
        });
        Self { inner }
    }

    /// The wrapped state.
    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Whether the source value has held still for the delay.
    pub fn is_settled(&self) -> bool {
        self.inner.settled()
    }
}

impl<V: Clone + PartialEq + 'static> DebouncedState<FieldState<V>> {
    /// An undebounced field for the UI paired with a debounced view of it.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use formstate::{DebouncedState, State};
    ///
    /// # async fn demo() {
    /// let name = DebouncedState::field(String::new(), Duration::from_millis(300));
    /// name.source().on_change("A".to_string());
    /// assert_eq!(name.source().value(), "A");
    /// assert_eq!(name.value(), "");
    /// # }
    /// ```
    pub fn field(initial: V, delay: Duration) -> Self {
        Self::with_delay(FieldState::with_delay(initial, Duration::ZERO), delay)
    }
}

impl<V: Clone> Snapshot<V> {
    fn of<S: State<Value = V>>(source: &S) -> Self {
        Self {
            value: source.value(),
            touched: source.touched(),
            activated: source.activated(),
            status: source.validate_status(),
            error: source.error(),
            own_error: source.own_error(),
        }
    }
}

impl<S: State> DebouncedInner<S> {
    fn settled(&self) -> bool {
        Instant::now().saturating_duration_since(self.source.changed_at()) >= self.delay
    }

    fn sync(&self) {
        let snapshot = Snapshot::of(&self.source);
        if *self.snapshot.borrow() == snapshot {
            return;
        }
        self.snapshot.replace(snapshot);
        tracing::trace!("settled view refreshed");
        self.listeners.notify();
    }

    fn stop_watcher(&self) {
        if let Some(watcher) = self.watcher.borrow_mut().take() {
            watcher.abort();
        }
    }

    /// The view for a read: fresh when settled, else the last snapshot.
    fn view(&self) -> Snapshot<S::Value> {
        if self.settled() && !self.disposer.is_disposed() {
            self.sync();
        }
        self.snapshot.borrow().clone()
    }
}

impl<S: State> Drop for DebouncedInner<S> {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

async fn watch<S: State>(inner: Weak<DebouncedInner<S>>, changes: Rc<Notify>) {
    loop {
        let Some(state) = inner.upgrade() else {
            return;
        };
        let due = state.source.changed_at() + state.delay;
        let settled = Instant::now() >= due;
        tracing::trace!(settled, "settle watcher woke");
        if settled && !state.disposer.is_disposed() {
            state.sync();
        }
        drop(state);
        if settled {
            changes.notified().await;
        } else {
            tokio::select! {
                () = changes.notified() => {}
                () = tokio::time::sleep_until(due) => {}
            }
        }
    }
}

impl<S: State> Clone for DebouncedState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: State> fmt::Debug for DebouncedState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedState")
            .field("delay", &self.inner.delay)
            .field("settled", &self.inner.settled())
            .finish_non_exhaustive()
    }
}

impl<S: State> Validatable for DebouncedState<S> {
    fn validate_status(&self) -> ValidateStatus {
        self.inner.view().status
    }

    fn own_error(&self) -> Option<String> {
        self.inner.view().own_error
    }

    fn error(&self) -> Option<String> {
        self.inner.view().error
    }

    fn touched(&self) -> bool {
        self.inner.view().touched
    }

    fn activated(&self) -> bool {
        self.inner.view().activated
    }

    fn disabled(&self) -> bool {
        self.inner.source.disabled()
    }

    /// When the settled value last changed.
    fn changed_at(&self) -> Instant {
        self.inner.source.changed_at() + self.inner.delay
    }

    fn reset(&self) {
        self.inner.source.reset();
        self.inner.sync();
    }

    fn dispose(&self) {
        if self.inner.disposer.is_disposed() {
            return;
        }
        self.inner.disposer.dispose();
        self.inner.source.dispose();
    }

    fn flush(&self) {
        self.inner.source.flush();
    }

    fn subscribe(&self, listener: &Rc<Notify>) {
        self.inner.listeners.add(listener);
    }

    fn validate_error(&self) -> LocalBoxFuture<'static, Option<String>> {
        self.validate().map(ValidateResult::into_error).boxed_local()
    }
}

impl<S: State> State for DebouncedState<S> {
    type Value = S::Value;

    fn value(&self) -> S::Value {
        self.inner.view().value
    }

    fn initial_value(&self) -> S::Value {
        self.inner.source.initial_value()
    }

    fn on_change(&self, value: S::Value) {
        self.inner.source.on_change(value);
    }

    fn set(&self, value: S::Value) {
        self.inner.source.set(value);
    }

    fn reset_with(&self, value: S::Value) {
        self.inner.source.reset_with(value);
        self.inner.sync();
    }

    fn validate(&self) -> LocalBoxFuture<'static, ValidateResult<S::Value>> {
        self.inner.source.flush();
        let pending = self.inner.source.validate();
        let inner = self.inner.clone();
        async move {
            let result = pending.await;
            inner.sync();
            result
        }
        .boxed_local()
    }

    fn add_validator(&self, validator: Validator<S::Value>) {
        self.inner.source.add_validator(validator);
    }

    fn add_disable_when(&self, predicate: DisablePredicate) {
        self.inner.source.add_disable_when(predicate);
    }
}
