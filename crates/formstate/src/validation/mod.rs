#![forbid(unsafe_code)]

//! Validators, their outcomes, and how a list of them becomes one decision.
//!
//! A validator is any `Fn(&V) -> R` where `R: Into<Validation>`: a message
//! string (empty means pass), an `Option`, a [`ValidationError`], or an async
//! [`Validation::pending`] result.
//!
//! # Example
//!
//! ```rust
//! use formstate::validation::{compose, validator, Composed};
//!
//! let validators = vec![
//!     validator(|v: &i32| if *v < 0 { "negative" } else { "" }),
//!     validator(|v: &i32| if *v > 100 { "too big" } else { "" }),
//! ];
//! assert!(matches!(compose(&validators, &5), Composed::Ready(None)));
//! ```

pub mod builtin;
mod compose;
mod outcome;
pub mod trace;

pub use compose::{Composed, compose};
pub use outcome::{Validation, ValidationError, ValidationOutcome, Validator, validator};
pub use trace::{ValidationEvent, ValidationToken, ValidationTrace};
