#![forbid(unsafe_code)]

//! Built-in validators for common rules.
//!
//! Each constructor returns a closure usable with
//! [`State::with_validator`](crate::state::State::with_validator). Failures
//! carry a stable error code.
//!
//! ```rust
//! use formstate::validation::builtin::{min_length, required};
//!
//! assert!(!required()(&String::new()).is_valid());
//! assert!(min_length(3)(&"alice".to_string()).is_valid());
//! ```

use std::fmt;

use super::{ValidationError, ValidationOutcome};

/// Error code for required field validation.
pub const ERROR_CODE_REQUIRED: &str = "required";
/// Error code for minimum length validation.
pub const ERROR_CODE_MIN_LENGTH: &str = "too_short";
/// Error code for maximum length validation.
pub const ERROR_CODE_MAX_LENGTH: &str = "too_long";
/// Error code for substring validation.
pub const ERROR_CODE_PATTERN: &str = "pattern";
/// Error code for email validation.
pub const ERROR_CODE_EMAIL: &str = "email";
/// Error code for range validation.
pub const ERROR_CODE_RANGE: &str = "range";

fn fail(code: &'static str, message: impl Into<String>) -> ValidationOutcome {
    ValidationOutcome::Error(ValidationError::new(code, message))
}

/// The value must contain something other than whitespace.
pub fn required() -> impl Fn(&String) -> ValidationOutcome + Clone + 'static {
    |value: &String| {
        if value.trim().is_empty() {
            fail(ERROR_CODE_REQUIRED, "This field is required")
        } else {
            ValidationOutcome::Valid
        }
    }
}

/// The value must have at least `min` characters.
pub fn min_length(min: usize) -> impl Fn(&String) -> ValidationOutcome + Clone + 'static {
    move |value: &String| {
        if value.chars().count() < min {
            fail(
                ERROR_CODE_MIN_LENGTH,
                format!("Must be at least {min} characters"),
            )
        } else {
            ValidationOutcome::Valid
        }
    }
}

/// The value must have at most `max` characters.
pub fn max_length(max: usize) -> impl Fn(&String) -> ValidationOutcome + Clone + 'static {
    move |value: &String| {
        if value.chars().count() > max {
            fail(
                ERROR_CODE_MAX_LENGTH,
                format!("Must be at most {max} characters"),
            )
        } else {
            ValidationOutcome::Valid
        }
    }
}

/// The value must contain `pattern`.
pub fn contains(
    pattern: impl Into<String>,
    message: impl Into<String>,
) -> impl Fn(&String) -> ValidationOutcome + Clone + 'static {
    contains_owned(pattern.into(), message.into())
}

fn contains_owned(
    pattern: String,
    message: String,
) -> impl Fn(&String) -> ValidationOutcome + Clone + 'static {
    move |value: &String| {
        if value.contains(pattern.as_str()) {
            ValidationOutcome::Valid
        } else {
            fail(ERROR_CODE_PATTERN, message.clone())
        }
    }
}

/// The value must look like an email address. Empty values pass; combine
/// with [`required`] to demand one.
pub fn email() -> impl Fn(&String) -> ValidationOutcome + Clone + 'static {
    |value: &String| {
        if looks_like_email(value.trim()) {
            ValidationOutcome::Valid
        } else {
            fail(ERROR_CODE_EMAIL, "Invalid email address")
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return false;
    }
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return false;
    }
    parts.last().is_some_and(|tld| tld.len() >= 2)
}

/// The value must lie within `min..=max`.
pub fn range<T>(min: T, max: T) -> impl Fn(&T) -> ValidationOutcome + Clone + 'static
where
    T: PartialOrd + fmt::Display + Copy + 'static,
{
    move |value: &T| {
        if *value >= min && *value <= max {
            ValidationOutcome::Valid
        } else {
            fail(ERROR_CODE_RANGE, format!("Must be between {min} and {max}"))
        }
    }
}
