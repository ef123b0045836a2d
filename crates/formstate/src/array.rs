#![forbid(unsafe_code)]

//! The ordered composite.
//!
//! Children are created from values by an element factory. Assigning a new
//! list reconciles by position: children at shared indices keep their
//! identity and receive the new value, extra values get new children, and
//! excess children are disposed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::composite::{Composite, CompositeCore};
use crate::config::StateConfig;
use crate::error::StateError;
use crate::state::{DisablePredicate, State, Validatable, ValidateResult, ValidateStatus};
use crate::validation::{ValidationTrace, Validator};

type Factory<S> = Rc<dyn Fn(<S as State>::Value) -> S>;

/// An ordered list of child states of one type.
///
/// ```rust
/// use std::time::Duration;
/// use formstate::{ArrayFormState, FieldState, State};
///
/// let tags = ArrayFormState::new(vec!["a".to_string()], |v| {
///     FieldState::with_delay(v, Duration::ZERO)
/// });
/// tags.append("b".to_string()).unwrap();
/// tags.move_item(1, 0).unwrap();
/// assert_eq!(tags.value(), ["b", "a"]);
/// ```
pub struct ArrayFormState<S: State> {
    inner: Rc<ArrayInner<S>>,
}

struct ArrayInner<S: State> {
    children: RefCell<Vec<S>>,
    initial: RefCell<Vec<S::Value>>,
    factory: Factory<S>,
    composite: CompositeCore<Vec<S::Value>>,
}

impl<S: State> ArrayFormState<S> {
    /// Create from initial values and an element factory.
    pub fn new<F>(initial: Vec<S::Value>, factory: F) -> Self
    where
        F: Fn(S::Value) -> S + 'static,
    {
        Self::with_config(initial, factory, StateConfig::default())
    }

    /// Create with a config. Only `enable_trace` applies to composites.
    pub fn with_config<F>(initial: Vec<S::Value>, factory: F, config: StateConfig) -> Self
    where
        F: Fn(S::Value) -> S + 'static,
    {
        let factory: Factory<S> = Rc::new(factory);
        let children = initial.iter().cloned().map(|v| factory(v)).collect();
        Self {
            inner: Rc::new(ArrayInner {
                children: RefCell::new(children),
                initial: RefCell::new(initial),
                factory,
                composite: CompositeCore::new("array", &config),
            }),
        }
    }

    /// Handles to the current children.
    pub fn states(&self) -> Vec<S> {
        self.inner.children.borrow().clone()
    }

    pub fn get(&self, index: usize) -> Option<S> {
        self.inner.children.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.children.borrow().is_empty()
    }

    pub fn trace(&self) -> Option<ValidationTrace> {
        self.inner.composite.core.trace()
    }

    /// Insert a new child for `value` before `index`.
    pub fn insert(&self, index: usize, value: S::Value) -> Result<(), StateError> {
        self.ensure_live()?;
        let len = self.len();
        if index > len {
            return Err(StateError::IndexOutOfBounds { index, len });
        }
        let child = self.create(value);
        self.inner.children.borrow_mut().insert(index, child);
        self.inner.composite.mark_structural();
        Ok(())
    }

    /// Append a new child for `value`.
    pub fn append(&self, value: S::Value) -> Result<(), StateError> {
        self.insert(self.len(), value)
    }

    /// Remove and dispose the child at `index`, returning its value.
    pub fn remove(&self, index: usize) -> Result<S::Value, StateError> {
        self.ensure_live()?;
        let len = self.len();
        if index >= len {
            return Err(StateError::IndexOutOfBounds { index, len });
        }
        let child = self.inner.children.borrow_mut().remove(index);
        let value = child.value();
        child.dispose();
        self.inner.composite.mark_structural();
        Ok(value)
    }

    /// Move the child at `from` so that it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<(), StateError> {
        self.ensure_live()?;
        let len = self.len();
        for index in [from, to] {
            if index >= len {
                return Err(StateError::IndexOutOfBounds { index, len });
            }
        }
        {
            let mut children = self.inner.children.borrow_mut();
            let child = children.remove(from);
            children.insert(to, child);
        }
        self.inner.composite.mark_structural();
        Ok(())
    }

    fn create(&self, value: S::Value) -> S {
        let child = (self.inner.factory)(value);
        self.inner.composite.adopt(&child);
        child
    }

    fn ensure_live(&self) -> Result<(), StateError> {
        if self.inner.composite.core.is_disposed() {
            Err(StateError::Disposed)
        } else {
            Ok(())
        }
    }

    fn reconcile(&self, values: Vec<S::Value>, apply: impl Fn(&S, S::Value)) {
        if self.inner.composite.core.is_disposed() {
            return;
        }
        let current = self.states();
        let shared = current.len().min(values.len());
        let mut values = values.into_iter();
        for (child, value) in current.iter().zip(values.by_ref()) {
            apply(child, value);
        }
        let added: Vec<S> = values.map(|v| self.create(v)).collect();
        let removed = {
            let mut children = self.inner.children.borrow_mut();
            let removed = children.split_off(shared);
            children.extend(added.iter().cloned());
            removed
        };
        if !added.is_empty() || !removed.is_empty() {
            tracing::debug!(added = added.len(), removed = removed.len(), "reconciled children");
            for child in &removed {
                child.dispose();
            }
            self.inner.composite.mark_structural();
        }
    }
}

impl<S: State> Clone for ArrayFormState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: State> fmt::Debug for ArrayFormState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayFormState")
            .field("len", &self.len())
            .field("status", &self.inner.composite.core.raw_status())
            .finish_non_exhaustive()
    }
}

impl<S: State> Composite for ArrayFormState<S> {
    type Value = Vec<S::Value>;

    fn composite(&self) -> &CompositeCore<Vec<S::Value>> {
        &self.inner.composite
    }

    fn aggregate_value(&self) -> Vec<S::Value> {
        self.states().iter().map(State::value).collect()
    }

    fn visit_children(&self, f: &mut dyn FnMut(&dyn Validatable)) {
        // Snapshot so child callbacks may touch this list.
        for child in self.states() {
            f(&child);
        }
    }
}

impl<S: State> Validatable for ArrayFormState<S> {
    fn validate_status(&self) -> ValidateStatus {
        self.aggregate_status()
    }

    fn own_error(&self) -> Option<String> {
        self.aggregate_own_error()
    }

    fn error(&self) -> Option<String> {
        self.aggregate_error()
    }

    fn touched(&self) -> bool {
        self.aggregate_touched()
    }

    fn activated(&self) -> bool {
        self.aggregate_activated()
    }

    fn disabled(&self) -> bool {
        self.inner.composite.core.disabled()
    }

    fn changed_at(&self) -> Instant {
        self.aggregate_changed_at()
    }

    fn reset(&self) {
        if self.inner.composite.core.is_disposed() {
            return;
        }
        let fresh: Vec<S> = self
            .inner
            .initial
            .borrow()
            .iter()
            .cloned()
            .map(|v| self.create(v))
            .collect();
        let stale = self.inner.children.replace(fresh);
        for child in &stale {
            child.dispose();
        }
        self.inner.composite.reset();
    }

    fn dispose(&self) {
        self.dispose_all();
    }

    fn flush(&self) {
        self.flush_children();
    }

    fn subscribe(&self, listener: &Rc<Notify>) {
        self.subscribe_all(listener);
    }

    fn validate_error(&self) -> LocalBoxFuture<'static, Option<String>> {
        self.validate().map(ValidateResult::into_error).boxed_local()
    }
}

impl<S: State> State for ArrayFormState<S> {
    type Value = Vec<S::Value>;

    fn value(&self) -> Vec<S::Value> {
        self.aggregate_value()
    }

    fn initial_value(&self) -> Vec<S::Value> {
        self.inner.initial.borrow().clone()
    }

    fn on_change(&self, value: Vec<S::Value>) {
        self.reconcile(value, |child, v| child.on_change(v));
    }

    fn set(&self, value: Vec<S::Value>) {
        self.reconcile(value, |child, v| child.set(v));
        self.inner.composite.mark_touched();
    }

    fn reset_with(&self, value: Vec<S::Value>) {
        self.inner.initial.replace(value);
        self.reset();
    }

    fn validate(&self) -> LocalBoxFuture<'static, ValidateResult<Vec<S::Value>>> {
        self.validate_all()
    }

    fn add_validator(&self, validator: Validator<Vec<S::Value>>) {
        self.inner.composite.core.add_validator(validator);
    }

    fn add_disable_when(&self, predicate: DisablePredicate) {
        self.inner.composite.core.add_disable_when(predicate);
    }
}
