#![forbid(unsafe_code)]

//! Validation tokens and the event trace of a state's validation lifecycle.
//!
//! Every time the value a state validates changes, the state issues a new
//! [`ValidationToken`]. A validation pass runs under the token current when
//! it started; its result is applied only if that token is still current when
//! the result arrives. Results for older tokens are discarded.
//!
//! When tracing is enabled (see [`StateConfig`](crate::config::StateConfig)),
//! each state records the lifecycle as [`ValidationEvent`]s, which tests use
//! to assert that a superseded result really was dropped.

use std::fmt;

// ---------------------------------------------------------------------------
// ValidationToken
// ---------------------------------------------------------------------------

/// A monotonically increasing revision of the value being validated.
///
/// # Invariants
///
/// - Tokens are strictly monotonic: `token_n < token_{n+1}`
/// - Token 0 is reserved for "no validation"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidationToken(u64);

impl ValidationToken {
    /// The null token representing no validation.
    pub const NONE: Self = Self(0);

    /// The first token a state issues.
    pub const FIRST: Self = Self(1);

    /// Create a token from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw token value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if this is the null token.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The token following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Default for ValidationToken {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ValidationEvent
// ---------------------------------------------------------------------------

/// An event in the validation lifecycle.
///
/// `elapsed_ns` is measured on the tokio clock from the state's creation, so
/// traces are reproducible under a paused clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEvent {
    /// A validation pass started for a token.
    Started {
        token: ValidationToken,
        elapsed_ns: u64,
    },

    /// An in-flight pass was superseded by a value change.
    Superseded {
        token: ValidationToken,
        /// The newer token that superseded this one.
        superseded_by: ValidationToken,
        elapsed_ns: u64,
    },

    /// A result was applied to the state.
    Applied {
        token: ValidationToken,
        is_valid: bool,
        elapsed_ns: u64,
    },

    /// A result arrived for an outdated token and was dropped.
    StaleDiscarded {
        token: ValidationToken,
        /// The current token when the result arrived.
        current_token: ValidationToken,
        elapsed_ns: u64,
    },
}

impl ValidationEvent {
    /// Get the token associated with this event.
    #[must_use]
    pub fn token(&self) -> ValidationToken {
        match self {
            Self::Started { token, .. }
            | Self::Superseded { token, .. }
            | Self::Applied { token, .. }
            | Self::StaleDiscarded { token, .. } => *token,
        }
    }

    /// Get the event type name for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Superseded { .. } => "superseded",
            Self::Applied { .. } => "applied",
            Self::StaleDiscarded { .. } => "stale_discarded",
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationTrace
// ---------------------------------------------------------------------------

/// An ordered record of validation events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationTrace {
    events: Vec<ValidationEvent>,
}

impl ValidationTrace {
    /// Create a new empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the trace.
    pub fn push(&mut self, event: ValidationEvent) {
        self.events.push(event);
    }

    /// Get all events in the trace.
    #[must_use]
    pub fn events(&self) -> &[ValidationEvent] {
        &self.events
    }

    /// Check if the trace contains a specific event type for a token.
    #[must_use]
    pub fn contains_event_type(&self, token: ValidationToken, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.token() == token && e.event_type() == event_type)
    }

    /// Count events of a type across all tokens.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Get all events for a specific token.
    #[must_use]
    pub fn events_for_token(&self, token: ValidationToken) -> Vec<&ValidationEvent> {
        self.events.iter().filter(|e| e.token() == token).collect()
    }

    /// Get the number of events in the trace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the trace is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events from the trace.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Verify trace invariants.
    ///
    /// Returns a list of violations if any invariants are broken.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        // Each token is validated at most once, in increasing order.
        let mut last_started = ValidationToken::NONE;
        for event in &self.events {
            if let ValidationEvent::Started { token, .. } = event {
                if *token <= last_started {
                    violations.push(format!(
                        "Non-monotonic start token: {} after {}",
                        token, last_started
                    ));
                }
                last_started = *token;
            }
        }

        for event in &self.events {
            match event {
                ValidationEvent::StaleDiscarded {
                    token,
                    current_token,
                    ..
                } if token >= current_token => {
                    violations.push(format!(
                        "StaleDiscarded with non-stale token: {} >= {}",
                        token, current_token
                    ));
                }
                ValidationEvent::Superseded {
                    token,
                    superseded_by,
                    ..
                } if token >= superseded_by => {
                    violations.push(format!(
                        "Superseded by an older token: {} >= {}",
                        token, superseded_by
                    ));
                }
                _ => {}
            }
        }

        // A token is applied at most once.
        let mut applied: Vec<ValidationToken> = self
            .events
            .iter()
            .filter_map(|e| match e {
                ValidationEvent::Applied { token, .. } => Some(*token),
                _ => None,
            })
            .collect();
        let total = applied.len();
        applied.sort();
        applied.dedup();
        if applied.len() != total {
            violations.push("A token was applied more than once".to_string());
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_none_is_zero() {
        assert_eq!(ValidationToken::NONE.raw(), 0);
        assert!(ValidationToken::NONE.is_none());
        assert!(!ValidationToken::FIRST.is_none());
    }

    #[test]
    fn token_next_is_ordered() {
        let t1 = ValidationToken::FIRST;
        let t2 = t1.next();
        assert!(t1 < t2);
        assert_eq!(t2.raw(), 2);
    }

    #[test]
    fn token_display() {
        let token = ValidationToken::from_raw(123);
        assert_eq!(format!("{token}"), "Token(123)");
    }

    #[test]
    fn event_type_names() {
        let token = ValidationToken::from_raw(1);
        let newer = ValidationToken::from_raw(2);

        let cases = [
            (
                ValidationEvent::Started {
                    token,
                    elapsed_ns: 0,
                },
                "started",
            ),
            (
                ValidationEvent::Superseded {
                    token,
                    superseded_by: newer,
                    elapsed_ns: 0,
                },
                "superseded",
            ),
            (
                ValidationEvent::Applied {
                    token,
                    is_valid: true,
                    elapsed_ns: 0,
                },
                "applied",
            ),
            (
                ValidationEvent::StaleDiscarded {
                    token,
                    current_token: newer,
                    elapsed_ns: 0,
                },
                "stale_discarded",
            ),
        ];
        for (event, name) in cases {
            assert_eq!(event.event_type(), name);
            assert_eq!(event.token(), token);
        }
    }

    #[test]
    fn verify_invariants_flags_non_monotonic_start() {
        let mut trace = ValidationTrace::new();
        trace.push(ValidationEvent::Started {
            token: ValidationToken::from_raw(2),
            elapsed_ns: 0,
        });
        trace.push(ValidationEvent::Started {
            token: ValidationToken::from_raw(2),
            elapsed_ns: 10,
        });
        assert_eq!(trace.verify_invariants().len(), 1);
    }

    #[test]
    fn verify_invariants_flags_fresh_stale_discard() {
        let mut trace = ValidationTrace::new();
        trace.push(ValidationEvent::StaleDiscarded {
            token: ValidationToken::from_raw(3),
            current_token: ValidationToken::from_raw(3),
            elapsed_ns: 0,
        });
        assert!(!trace.verify_invariants().is_empty());
    }

    #[test]
    fn well_formed_trace_passes() {
        let mut trace = ValidationTrace::new();
        let t1 = ValidationToken::FIRST;
        let t2 = t1.next();
        trace.push(ValidationEvent::Started {
            token: t1,
            elapsed_ns: 0,
        });
        trace.push(ValidationEvent::Superseded {
            token: t1,
            superseded_by: t2,
            elapsed_ns: 5,
        });
        trace.push(ValidationEvent::Started {
            token: t2,
            elapsed_ns: 5,
        });
        trace.push(ValidationEvent::Applied {
            token: t2,
            is_valid: false,
            elapsed_ns: 8,
        });
        trace.push(ValidationEvent::StaleDiscarded {
            token: t1,
            current_token: t2,
            elapsed_ns: 9,
        });
        assert!(trace.verify_invariants().is_empty());
        assert_eq!(trace.events_for_token(t1).len(), 3);
        assert!(trace.contains_event_type(t2, "applied"));
        assert_eq!(trace.count("started"), 2);
    }
}
