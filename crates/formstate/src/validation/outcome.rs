#![forbid(unsafe_code)]

//! Validator outcomes and the validator function type.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// An error object returned by a validator.
///
/// The `code` field is a stable identifier for programmatic handling; the
/// `message` is what consumers see through `error()`. The message must not
/// be empty.
///
/// # Example
///
/// ```rust
/// use formstate::validation::ValidationError;
///
/// let error = ValidationError::new("too_short", "Must be at least 3 characters");
/// assert_eq!(error.to_string(), "Must be at least 3 characters");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Stable error code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an error carrying only a message.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::new("custom", message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// ValidationOutcome
// ---------------------------------------------------------------------------

/// What a single validator decided about a value.
///
/// An empty [`Message`](Self::Message) counts as a pass, so validators can
/// be written as `|v| if bad(v) { "message" } else { "" }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationOutcome {
    /// The value passes.
    #[default]
    Valid,
    /// The value fails with a message (empty means pass).
    Message(String),
    /// The value fails with an error object.
    Error(ValidationError),
}

impl ValidationOutcome {
    /// Normalize into an error message, `None` when the value passes.
    ///
    /// # Panics
    ///
    /// Panics when an error object carries an empty message. That is a
    /// defect in the validator, not a property of the value.
    #[must_use]
    pub fn into_error(self) -> Option<String> {
        match self {
            Self::Valid => None,
            Self::Message(message) if message.is_empty() => None,
            Self::Message(message) => Some(message),
            Self::Error(error) => {
                assert!(
                    !error.message.is_empty(),
                    "validation error object must carry a non-empty message (code: {})",
                    error.code
                );
                Some(error.message)
            }
        }
    }

    /// Returns `true` if this outcome is a pass.
    ///
    /// # Panics
    ///
    /// Same as [`into_error`](Self::into_error).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.clone().into_error().is_none()
    }
}

impl From<&str> for ValidationOutcome {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}

impl From<String> for ValidationOutcome {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<ValidationError> for ValidationOutcome {
    fn from(error: ValidationError) -> Self {
        Self::Error(error)
    }
}

impl<T: Into<ValidationOutcome>> From<Option<T>> for ValidationOutcome {
    fn from(outcome: Option<T>) -> Self {
        outcome.map_or(Self::Valid, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// The result of invoking a validator: available now, or still pending.
pub enum Validation {
    /// Synchronously available outcome.
    Ready(ValidationOutcome),
    /// Outcome that resolves later on the local executor.
    Pending(LocalBoxFuture<'static, ValidationOutcome>),
}

impl Validation {
    /// Wrap an async validation.
    ///
    /// ```rust
    /// use formstate::validation::Validation;
    ///
    /// let pending = Validation::pending(async { "taken" });
    /// assert!(pending.is_pending());
    /// ```
    pub fn pending<F>(future: F) -> Self
    where
        F: Future + 'static,
        F::Output: Into<ValidationOutcome>,
    {
        Self::Pending(future.map(Into::into).boxed_local())
    }

    /// Returns `true` if the outcome is not yet available.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

impl From<ValidationOutcome> for Validation {
    fn from(outcome: ValidationOutcome) -> Self {
        Self::Ready(outcome)
    }
}

impl From<&str> for Validation {
    fn from(message: &str) -> Self {
        Self::Ready(message.into())
    }
}

impl From<String> for Validation {
    fn from(message: String) -> Self {
        Self::Ready(message.into())
    }
}

impl From<ValidationError> for Validation {
    fn from(error: ValidationError) -> Self {
        Self::Ready(error.into())
    }
}

impl<T: Into<ValidationOutcome>> From<Option<T>> for Validation {
    fn from(outcome: Option<T>) -> Self {
        Self::Ready(outcome.into())
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// A validator for values of type `V`.
pub type Validator<V> = Rc<dyn Fn(&V) -> Validation>;

/// Box a closure as a [`Validator`].
pub fn validator<V, F, R>(f: F) -> Validator<V>
where
    F: Fn(&V) -> R + 'static,
    R: Into<Validation>,
{
    Rc::new(move |value: &V| f(value).into())
}
