#![forbid(unsafe_code)]

//! formstate
//!
//! Reactive "value + validation status" state for forms.
//!
//! # Key Components
//!
//! - [`FieldState`] - One editable value with input debounce
//! - [`FormState`] - Keyed composite over a [`FieldGroup`]
//! - [`ArrayFormState`] - Ordered composite with positional reconciliation
//! - [`TransformedState`] - Typed lens over another state
//! - [`DebouncedState`] - Settle-delayed read projection of another state
//! - [`validation`] - Validator outcomes, composition and tracing
//! - [`Disposer`] - Run-once teardown callbacks
//!
//! # How it fits together
//!
//! Input enters a [`FieldState`] through `on_change`, commits after a quiet
//! period, and runs the field's validators. Composites aggregate their
//! children on every read; there is no child to parent link. Adapters and
//! wrappers sit on top of any state and forward to it.
//!
//! Everything is single-threaded. States are `Rc` handles and schedule
//! timers and async validators with `tokio::task::spawn_local`, so code that
//! feeds debounced input, runs async validators or builds a
//! [`DebouncedState`] must run inside a `tokio::task::LocalSet`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use formstate::{FieldState, State, Validatable, ValidateStatus};
//! use formstate::validation::builtin::min_length;
//!
//! let name = FieldState::with_delay(String::new(), Duration::ZERO).with_validator(min_length(2));
//! name.on_change("A".to_string());
//! assert_eq!(name.validate_status(), ValidateStatus::Validated);
//! assert_eq!(name.error().as_deref(), Some("Must be at least 2 characters"));
//! ```

pub mod array;
mod composite;
pub mod config;
mod shared;
pub mod debounced;
pub mod disposable;
pub mod error;
pub mod field;
pub mod form;
pub mod state;
pub mod transform;
pub mod validation;

pub use array::ArrayFormState;
pub use composite::aggregate_status;
pub use config::{DEFAULT_DELAY, StateConfig};
pub use debounced::DebouncedState;
pub use disposable::Disposer;
pub use error::StateError;
pub use field::FieldState;
pub use form::{FieldGroup, FormState};
pub use state::{DisablePredicate, State, Validatable, ValidateResult, ValidateStatus};
pub use transform::TransformedState;
