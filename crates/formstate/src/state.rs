#![forbid(unsafe_code)]

//! The contract every state implements.
//!
//! [`Validatable`] is the object-safe half: status, errors, activation and
//! lifecycle. Composites hold their children through it, so a parent can
//! aggregate leaves, nested composites and adapters alike. [`State`] adds the
//! typed value surface.
//!
//! # Status machine
//!
//! ```text
//!                 committed value changes
//!        ┌───────────────────────────────────────┐
//!        ▼                                       │
//!  NotValidated ──(activated)──▶ Validating ──▶ Validated
//!
//!  WontValidate overlays all three while a disable predicate holds.
//! ```

use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::validation::{Validation, Validator, validator};

/// Where a state is in its validation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidateStatus {
    /// The current value has not been validated.
    #[default]
    NotValidated,
    /// A validation pass is in flight.
    Validating,
    /// The current value has been validated.
    Validated,
    /// Validation is disabled.
    WontValidate,
}

impl ValidateStatus {
    /// Stable lowercase name, for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotValidated => "not_validated",
            Self::Validating => "validating",
            Self::Validated => "validated",
            Self::WontValidate => "wont_validate",
        }
    }
}

impl fmt::Display for ValidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `validate()` resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateResult<V> {
    /// No error anywhere; carries the validated value.
    Valid(V),
    /// The effective error.
    Invalid(String),
}

impl<V> ValidateResult<V> {
    #[must_use]
    pub fn has_error(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(error) => Some(error),
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Invalid(_) => None,
        }
    }

    /// Discard the value, keeping the error.
    #[must_use]
    pub fn into_error(self) -> Option<String> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(error) => Some(error),
        }
    }

    /// Convert into a `Result`.
    pub fn into_result(self) -> Result<V, String> {
        match self {
            Self::Valid(value) => Ok(value),
            Self::Invalid(error) => Err(error),
        }
    }

    /// Map the valid value.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> ValidateResult<U> {
        match self {
            Self::Valid(value) => ValidateResult::Valid(f(value)),
            Self::Invalid(error) => ValidateResult::Invalid(error),
        }
    }
}

/// A predicate that, while true, disables validation.
pub type DisablePredicate = Rc<dyn Fn() -> bool>;

/// Status, error and lifecycle of a state, independent of its value type.
pub trait Validatable {
    /// Current status. `WontValidate` whenever [`disabled`](Self::disabled).
    fn validate_status(&self) -> ValidateStatus;

    /// Error from this state's own validators.
    fn own_error(&self) -> Option<String>;

    /// Own error, else the first descendant error.
    fn error(&self) -> Option<String>;

    /// The value differs from the initial value.
    fn touched(&self) -> bool;

    /// Auto-validation has been triggered since construction or last reset.
    fn activated(&self) -> bool;

    /// Some disable predicate currently holds.
    fn disabled(&self) -> bool;

    /// When the exposed value last changed.
    fn changed_at(&self) -> Instant;

    /// Restore the initial value and clear activation, status and error.
    fn reset(&self);

    /// Tear down timers and children. Terminal; a second call does nothing.
    fn dispose(&self);

    /// Commit any debounced input now.
    fn flush(&self) {}

    /// Register `listener` to be woken whenever the value, status, error,
    /// activation or touched flag may have changed. Composites forward it to
    /// their children, including ones created later. Listeners are held
    /// weakly; dropping the `Rc` unsubscribes.
    fn subscribe(&self, listener: &Rc<Notify>);

    /// Type-erased [`State::validate`].
    fn validate_error(&self) -> LocalBoxFuture<'static, Option<String>>;

    /// Alias of [`touched`](Self::touched).
    fn dirty(&self) -> bool {
        self.touched()
    }

    fn has_error(&self) -> bool {
        self.error().is_some()
    }

    fn has_own_error(&self) -> bool {
        self.own_error().is_some()
    }

    fn validating(&self) -> bool {
        self.validate_status() == ValidateStatus::Validating
    }

    fn validated(&self) -> bool {
        self.validate_status() == ValidateStatus::Validated
    }
}

/// A state with a typed value.
///
/// Implementors are cheap handles; clones share the same underlying state.
pub trait State: Validatable + Clone + 'static {
    type Value: Clone + PartialEq + 'static;

    /// The committed value.
    fn value(&self) -> Self::Value;

    fn initial_value(&self) -> Self::Value;

    /// Feed user input.
    fn on_change(&self, value: Self::Value);

    /// Set the value programmatically, bypassing input debounce.
    fn set(&self, value: Self::Value);

    /// Replace the initial value, then [`reset`](Validatable::reset).
    fn reset_with(&self, value: Self::Value);

    /// Commit pending input, activate, and wait for the current value's
    /// validation to settle.
    ///
    /// The synchronous part (commit, activation, starting validators) runs
    /// when this is called, not when the future is first polled.
    fn validate(&self) -> LocalBoxFuture<'static, ValidateResult<Self::Value>>;

    /// Append a validator.
    fn add_validator(&self, validator: Validator<Self::Value>);

    /// Append a disable predicate.
    fn add_disable_when(&self, predicate: DisablePredicate);

    /// Builder form of [`add_validator`](Self::add_validator).
    ///
    /// ```rust
    /// use formstate::{FieldState, State};
    ///
    /// let name = FieldState::new(String::new())
    ///     .with_validator(|v: &String| if v.is_empty() { "required" } else { "" });
    /// ```
    #[must_use]
    fn with_validator<F, R>(self, f: F) -> Self
    where
        F: Fn(&Self::Value) -> R + 'static,
        R: Into<Validation>,
    {
        self.add_validator(validator(f));
        self
    }

    /// Builder form of [`add_disable_when`](Self::add_disable_when).
    #[must_use]
    fn disable_when<F>(self, predicate: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.add_disable_when(Rc::new(predicate));
        self
    }
}
