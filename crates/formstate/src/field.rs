#![forbid(unsafe_code)]

//! The leaf state: one editable value.
//!
//! Input arrives through [`State::on_change`] as a raw value, which commits
//! after the configured delay passes without further input. Validators see
//! only committed values.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use formstate::{FieldState, State, Validatable};
//!
//! # async fn demo() {
//! let name = FieldState::with_delay(String::new(), Duration::from_millis(100))
//!     .with_validator(|v: &String| if v.is_empty() { "required" } else { "" });
//!
//! name.on_change("Al".to_string());
//! assert_eq!(name.raw_value(), "Al");
//! assert_eq!(name.value(), "");
//!
//! let result = name.validate().await;
//! assert_eq!(result.value().map(String::as_str), Some("Al"));
//! assert!(name.activated());
//! # }
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::StateConfig;
use crate::shared::Core;
use crate::state::{DisablePredicate, State, Validatable, ValidateResult, ValidateStatus};
use crate::validation::{ValidationTrace, Validator};

/// An atomic editable value with input debounce.
///
/// Cloning yields another handle to the same field.
pub struct FieldState<V: Clone + PartialEq + 'static> {
    inner: Rc<FieldInner<V>>,
}

struct FieldInner<V: Clone + PartialEq + 'static> {
    value: RefCell<V>,
    raw: RefCell<V>,
    initial: RefCell<V>,
    delay: Duration,
    changed_at: Cell<Instant>,
    pending: RefCell<Option<JoinHandle<()>>>,
    core: Rc<Core<V>>,
}

impl<V: Clone + PartialEq + 'static> FieldState<V> {
    /// Create a field with the default config.
    pub fn new(initial: V) -> Self {
        Self::with_config(initial, StateConfig::default())
    }

    /// Create a field with a custom input delay.
    pub fn with_delay(initial: V, delay: Duration) -> Self {
        Self::with_config(initial, StateConfig::default().with_delay(delay))
    }

    pub fn with_config(initial: V, config: StateConfig) -> Self {
        let inner = Rc::new(FieldInner {
            value: RefCell::new(initial.clone()),
            raw: RefCell::new(initial.clone()),
            initial: RefCell::new(initial),
            delay: config.delay,
            changed_at: Cell::new(Instant::now()),
            pending: RefCell::new(None),
            core: Core::new("field", &config),
        });
        let weak = Rc::downgrade(&inner);
        inner.core.disposer().add(move || {
            if let Some(inner) = weak.upgrade() {
                inner.cancel_pending();
            }
        });
        Self { inner }
    }

    /// The most recent input, committed or not.
    pub fn raw_value(&self) -> V {
        self.inner.raw.borrow().clone()
    }

    /// The input debounce delay.
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Recorded validation events, when tracing is enabled.
    pub fn trace(&self) -> Option<ValidationTrace> {
        self.inner.core.trace()
    }

    /// Whether an input commit is waiting on the debounce timer.
    pub fn has_pending_input(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }
}

impl<V: Clone + PartialEq + 'static> FieldInner<V> {
    fn cancel_pending(&self) {
        if let Some(handle) = self.pending.borrow_mut().take() {
            handle.abort();
        }
    }

    fn commit(&self, value: V, activate: bool) {
        if self.core.is_disposed() {
            return;
        }
        let changed = *self.value.borrow() != value;
        if changed {
            self.value.replace(value);
            self.changed_at.set(Instant::now());
            self.core.invalidate();
            tracing::trace!(token = %self.core.token(), "field value committed");
        }
        if activate {
            self.core.activate();
        }
        if self.core.activated() && self.core.raw_status() == ValidateStatus::NotValidated {
            let value = self.value.borrow().clone();
            self.core.run(&value);
        }
    }

    fn flush(&self) {
        let Some(handle) = self.pending.borrow_mut().take() else {
            return;
        };
        handle.abort();
        let raw = self.raw.borrow().clone();
        self.commit(raw, true);
    }

    fn schedule(self: &Rc<Self>) {
        let inner = Rc::downgrade(self);
        let delay = self.delay;
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.pending.borrow_mut().take();
                let raw = inner.raw.borrow().clone();
                inner.commit(raw, true);
            }
        });
        if let Some(previous) = self.pending.replace(Some(handle)) {
            previous.abort();
        }
    }
}

impl<V: Clone + PartialEq + 'static> Clone for FieldState<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for FieldState<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldState")
            .field("value", &*self.inner.value.borrow())
            .field("raw", &*self.inner.raw.borrow())
            .field("status", &self.inner.core.raw_status())
            .field("activated", &self.inner.core.activated())
            .finish_non_exhaustive()
    }
}

impl<V: Clone + PartialEq + 'static> Validatable for FieldState<V> {
    fn validate_status(&self) -> ValidateStatus {
        self.inner.core.status()
    }

    fn own_error(&self) -> Option<String> {
        self.inner.core.own_error()
    }

    fn error(&self) -> Option<String> {
        self.inner.core.own_error()
    }

    fn touched(&self) -> bool {
        *self.inner.value.borrow() != *self.inner.initial.borrow()
    }

    fn activated(&self) -> bool {
        self.inner.core.activated()
    }

    fn disabled(&self) -> bool {
        self.inner.core.disabled()
    }

    fn changed_at(&self) -> Instant {
        self.inner.changed_at.get()
    }

    fn reset(&self) {
        let inner = &self.inner;
        if inner.core.is_disposed() {
            return;
        }
        inner.cancel_pending();
        let initial = inner.initial.borrow().clone();
        if *inner.value.borrow() != initial {
            inner.changed_at.set(Instant::now());
        }
        inner.value.replace(initial.clone());
        inner.raw.replace(initial);
        inner.core.reset();
    }

    fn dispose(&self) {
        self.inner.core.dispose();
    }

    fn flush(&self) {
        self.inner.flush();
    }

    fn subscribe(&self, listener: &Rc<Notify>) {
        self.inner.core.listeners().add(listener);
    }

    fn validate_error(&self) -> LocalBoxFuture<'static, Option<String>> {
        self.validate().map(ValidateResult::into_error).boxed_local()
    }
}

impl<V: Clone + PartialEq + 'static> State for FieldState<V> {
    type Value = V;

    fn value(&self) -> V {
        self.inner.value.borrow().clone()
    }

    fn initial_value(&self) -> V {
        self.inner.initial.borrow().clone()
    }

    fn on_change(&self, value: V) {
        if self.inner.core.is_disposed() {
            return;
        }
        self.inner.raw.replace(value.clone());
        if self.inner.delay.is_zero() {
            self.inner.cancel_pending();
            self.inner.commit(value, true);
        } else {
            self.inner.schedule();
        }
    }

    fn set(&self, value: V) {
        self.inner.cancel_pending();
        self.inner.raw.replace(value.clone());
        self.inner.commit(value, false);
    }

    fn reset_with(&self, value: V) {
        self.inner.initial.replace(value);
        self.reset();
    }

    fn validate(&self) -> LocalBoxFuture<'static, ValidateResult<V>> {
        let inner = self.inner.clone();
        if !inner.core.is_disposed() {
            inner.cancel_pending();
            let raw = inner.raw.borrow().clone();
            inner.commit(raw, true);
            let value = inner.value.borrow().clone();
            inner.core.rerun_if_validators_changed(&value);
        }
        async move {
            inner.core.clone().settled().await;
            match inner.core.own_error() {
                Some(error) => ValidateResult::Invalid(error),
                None => ValidateResult::Valid(inner.value.borrow().clone()),
            }
        }
        .boxed_local()
    }

    fn add_validator(&self, validator: Validator<V>) {
        self.inner.core.add_validator(validator);
    }

    fn add_disable_when(&self, predicate: DisablePredicate) {
        self.inner.core.add_disable_when(predicate);
    }
}
