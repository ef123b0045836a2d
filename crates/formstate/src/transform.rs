#![forbid(unsafe_code)]

//! A typed lens over another state.
//!
//! [`TransformedState`] shows a source state of value type `A` as a state of
//! type `B` through `parse: A -> B` and `unparse: B -> A`. It holds no value
//! or validation state of its own; validators attached to it are translated
//! and run by the source.
//!
//! ```rust
//! use std::time::Duration;
//! use formstate::{FieldState, State, TransformedState, Validatable};
//!
//! // The widget edits text; the application wants a number.
//! let text = FieldState::with_delay("1".to_string(), Duration::ZERO);
//! let number = TransformedState::new(
//!     text,
//!     |s: &String| s.parse::<i64>().unwrap_or(0),
//!     |n: &i64| n.to_string(),
//! )
//! .with_validator(|n: &i64| if *n > 10 { "too big" } else { "" });
//!
//! number.on_change(42);
//! assert_eq!(number.source().value(), "42");
//! assert_eq!(number.error().as_deref(), Some("too big"));
//! ```

use std::fmt;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::state::{DisablePredicate, State, Validatable, ValidateResult, ValidateStatus};
use crate::validation::Validator;

/// A state of type `B` viewing a source state `S`.
pub struct TransformedState<S: State, B> {
    source: S,
    parse: Rc<dyn Fn(&S::Value) -> B>,
    unparse: Rc<dyn Fn(&B) -> S::Value>,
}

impl<S, B> TransformedState<S, B>
where
    S: State,
    B: Clone + PartialEq + 'static,
{
    /// Wrap `source`. `parse` and `unparse` are expected to be inverses.
    pub fn new<P, U>(source: S, parse: P, unparse: U) -> Self
    where
        P: Fn(&S::Value) -> B + 'static,
        U: Fn(&B) -> S::Value + 'static,
    {
        Self {
            source,
            parse: Rc::new(parse),
            unparse: Rc::new(unparse),
        }
    }

    /// The wrapped state.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: State, B> Clone for TransformedState<S, B> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            parse: self.parse.clone(),
            unparse: self.unparse.clone(),
        }
    }
}

impl<S: State + fmt::Debug, B> fmt::Debug for TransformedState<S, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformedState")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<S, B> Validatable for TransformedState<S, B>
where
    S: State,
    B: Clone + PartialEq + 'static,
{
    fn validate_status(&self) -> ValidateStatus {
        self.source.validate_status()
    }

    fn own_error(&self) -> Option<String> {
        self.source.own_error()
    }

    fn error(&self) -> Option<String> {
        self.source.error()
    }

    fn touched(&self) -> bool {
        self.source.touched()
    }

    fn activated(&self) -> bool {
        self.source.activated()
    }

    fn disabled(&self) -> bool {
        self.source.disabled()
    }

    fn changed_at(&self) -> Instant {
        self.source.changed_at()
    }

    fn reset(&self) {
        self.source.reset();
    }

    fn dispose(&self) {
        self.source.dispose();
    }

    fn flush(&self) {
        self.source.flush();
    }

    fn subscribe(&self, listener: &Rc<Notify>) {
        self.source.subscribe(listener);
    }

    fn validate_error(&self) -> LocalBoxFuture<'static, Option<String>> {
        self.source.validate_error()
    }
}

impl<S, B> State for TransformedState<S, B>
where
    S: State,
    B: Clone + PartialEq + 'static,
{
    type Value = B;

    fn value(&self) -> B {
        (self.parse)(&self.source.value())
    }

    fn initial_value(&self) -> B {
        (self.parse)(&self.source.initial_value())
    }

    fn on_change(&self, value: B) {
        self.source.on_change((self.unparse)(&value));
    }

    fn set(&self, value: B) {
        self.source.set((self.unparse)(&value));
    }

    fn reset_with(&self, value: B) {
        self.source.reset_with((self.unparse)(&value));
    }

    fn validate(&self) -> LocalBoxFuture<'static, ValidateResult<B>> {
        let parse = self.parse.clone();
        self.source
            .validate()
            .map(move |result| result.map(|value| parse(&value)))
            .boxed_local()
    }

    fn add_validator(&self, validator: Validator<B>) {
        let parse = self.parse.clone();
        self.source
            .add_validator(Rc::new(move |value: &S::Value| validator(&parse(value))));
    }

    fn add_disable_when(&self, predicate: DisablePredicate) {
        self.source.add_disable_when(predicate);
    }
}
