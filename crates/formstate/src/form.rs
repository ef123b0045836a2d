#![forbid(unsafe_code)]

//! The keyed composite.
//!
//! A [`FormState`] owns a [`FieldGroup`]: any fixed set of named child
//! states. `IndexMap<String, S>` is a ready-made group for homogeneous
//! children; a struct of differently-typed states implements the trait
//! directly.
//!
//! ```rust
//! use std::time::Duration;
//! use formstate::{FieldGroup, FieldState, FormState, State, Validatable};
//!
//! #[derive(Clone)]
//! struct Signup {
//!     name: FieldState<String>,
//!     age: FieldState<i32>,
//! }
//!
//! impl FieldGroup for Signup {
//!     type Value = (String, i32);
//!
//!     fn value(&self) -> Self::Value {
//!         (self.name.value(), self.age.value())
//!     }
//!     fn initial_value(&self) -> Self::Value {
//!         (self.name.initial_value(), self.age.initial_value())
//!     }
//!     fn set(&self, (name, age): Self::Value) {
//!         self.name.set(name);
//!         self.age.set(age);
//!     }
//!     fn on_change(&self, (name, age): Self::Value) {
//!         self.name.on_change(name);
//!         self.age.on_change(age);
//!     }
//!     fn reset_with(&self, (name, age): Self::Value) {
//!         self.name.reset_with(name);
//!         self.age.reset_with(age);
//!     }
//!     fn for_each(&self, f: &mut dyn FnMut(&str, &dyn Validatable)) {
//!         f("name", &self.name);
//!         f("age", &self.age);
//!     }
//! }
//!
//! let form = FormState::new(Signup {
//!     name: FieldState::with_delay(String::new(), Duration::ZERO),
//!     age: FieldState::with_delay(0, Duration::ZERO),
//! })
//! .with_validator(|(_, age): &(String, i32)| if *age < 0 { "bad age" } else { "" });
//!
//! form.fields().age.on_change(-1);
//! assert_eq!(form.error().as_deref(), Some("bad age"));
//! ```

use std::fmt;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::sync::Notify;
use indexmap::IndexMap;
use tokio::time::Instant;

use crate::composite::{Composite, CompositeCore};
use crate::config::StateConfig;
use crate::state::{DisablePredicate, State, Validatable, ValidateResult, ValidateStatus};
use crate::validation::{ValidationTrace, Validator};

/// A fixed set of named child states.
pub trait FieldGroup: Clone + 'static {
    type Value: Clone + PartialEq + 'static;

    fn value(&self) -> Self::Value;

    fn initial_value(&self) -> Self::Value;

    /// Apply `value` element-wise with `State::set`.
    fn set(&self, value: Self::Value);

    /// Apply `value` element-wise with `State::on_change`.
    fn on_change(&self, value: Self::Value);

    /// Apply `value` element-wise with `State::reset_with`.
    fn reset_with(&self, value: Self::Value);

    /// Visit each child with its key, in declaration order.
    fn for_each(&self, f: &mut dyn FnMut(&str, &dyn Validatable));
}

impl<S: State> FieldGroup for IndexMap<String, S> {
    type Value = IndexMap<String, S::Value>;

    fn value(&self) -> Self::Value {
        self.iter().map(|(k, s)| (k.clone(), s.value())).collect()
    }

    fn initial_value(&self) -> Self::Value {
        self.iter()
            .map(|(k, s)| (k.clone(), s.initial_value()))
            .collect()
    }

    fn set(&self, value: Self::Value) {
        for (key, v) in value {
            match self.get(&key) {
                Some(child) => child.set(v),
                None => tracing::debug!(%key, "set: no such field"),
            }
        }
    }

    fn on_change(&self, value: Self::Value) {
        for (key, v) in value {
            match self.get(&key) {
                Some(child) => child.on_change(v),
                None => tracing::debug!(%key, "on_change: no such field"),
            }
        }
    }

    fn reset_with(&self, value: Self::Value) {
        for (key, v) in value {
            if let Some(child) = self.get(&key) {
                child.reset_with(v);
            }
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &dyn Validatable)) {
        for (key, child) in self {
            f(key, child);
        }
    }
}

/// A keyed composite over a [`FieldGroup`].
pub struct FormState<G: FieldGroup> {
    inner: Rc<FormInner<G>>,
}

struct FormInner<G: FieldGroup> {
    fields: G,
    composite: CompositeCore<G::Value>,
}

impl<G: FieldGroup> FormState<G> {
    pub fn new(fields: G) -> Self {
        Self::with_config(fields, StateConfig::default())
    }

    /// Create with a config. Only `enable_trace` applies to composites.
    pub fn with_config(fields: G, config: StateConfig) -> Self {
        Self {
            inner: Rc::new(FormInner {
                fields,
                composite: CompositeCore::new("form", &config),
            }),
        }
    }

    /// The child states.
    pub fn fields(&self) -> &G {
        &self.inner.fields
    }

    /// Recorded events of the form's own validation, when tracing is enabled.
    pub fn trace(&self) -> Option<ValidationTrace> {
        self.inner.composite.core.trace()
    }
}

impl<G: FieldGroup> Clone for FormState<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<G: FieldGroup> fmt::Debug for FormState<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        self.inner.fields.for_each(&mut |key, _| keys.push(key.to_owned()));
        f.debug_struct("FormState")
            .field("fields", &keys)
            .field("status", &self.inner.composite.core.raw_status())
            .finish_non_exhaustive()
    }
}

impl<G: FieldGroup> Composite for FormState<G> {
    type Value = G::Value;

    fn composite(&self) -> &CompositeCore<G::Value> {
        &self.inner.composite
    }

    fn aggregate_value(&self) -> G::Value {
        self.inner.fields.value()
    }

    fn visit_children(&self, f: &mut dyn FnMut(&dyn Validatable)) {
        self.inner.fields.for_each(&mut |_, child| f(child));
    }
}

impl<G: FieldGroup> Validatable for FormState<G> {
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
        self.visit_children(&mut |child| child.reset());
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

impl<G: FieldGroup> State for FormState<G> {
    type Value = G::Value;

    fn value(&self) -> G::Value {
        self.inner.fields.value()
    }

    fn initial_value(&self) -> G::Value {
        self.inner.fields.initial_value()
    }

    fn on_change(&self, value: G::Value) {
        self.inner.fields.on_change(value);
    }

    fn set(&self, value: G::Value) {
        self.inner.fields.set(value);
        self.inner.composite.mark_touched();
    }

    fn reset_with(&self, value: G::Value) {
        self.inner.fields.reset_with(value);
        self.inner.composite.reset();
    }

    fn validate(&self) -> LocalBoxFuture<'static, ValidateResult<G::Value>> {
        self.validate_all()
    }

    fn add_validator(&self, validator: Validator<G::Value>) {
        self.inner.composite.core.add_validator(validator);
    }

    fn add_disable_when(&self, predicate: DisablePredicate) {
        self.inner.composite.core.add_disable_when(predicate);
    }
}
