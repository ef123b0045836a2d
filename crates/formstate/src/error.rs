#![forbid(unsafe_code)]

//! Errors for misuse of the structural editing API.
//!
//! Validation failures are never errors here: they surface as `error()` on
//! the state and as [`ValidateResult::Invalid`](crate::state::ValidateResult).

use std::fmt;

/// Misuse of an ordered composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// An index was outside the child list.
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// Number of children at the time of the call.
        len: usize,
    },
    /// The state was already disposed.
    Disposed,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for {len} children")
            }
            Self::Disposed => f.write_str("state has been disposed"),
        }
    }
}

impl std::error::Error for StateError {}
