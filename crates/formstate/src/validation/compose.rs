#![forbid(unsafe_code)]

//! Combining a list of validators into a single decision.
//!
//! # Decision Rule
//!
//! 1) Validators are invoked in list order, every one of them, one at a time.
//! 2) A pending result is recorded and the loop moves on without waiting.
//! 3) A synchronous failure ends the loop; it is the result and every pending
//!    result recorded so far is discarded.
//! 4) Otherwise the pending results race: the first failure to *arrive* wins,
//!    whatever its position in the list. All passes (or an empty list) pass.
//!
//! Discarded futures are never cancelled. They are detached onto the local
//! executor and run to completion with their outcomes ignored, so side
//! effects a validator started are not cut off halfway. Misbehaving
//! discarded validators are logged at `error` since nobody awaits them.

use std::panic::AssertUnwindSafe;

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};

use super::{Validation, ValidationOutcome, Validator};
use crate::shared::panic_message;

type PendingOutcome = LocalBoxFuture<'static, ValidationOutcome>;

/// The combined decision of a validator list.
pub enum Composed {
    /// Decided synchronously: `Some(error)` or `None` for a pass.
    Ready(Option<String>),
    /// Decided once the racing async validators resolve.
    Pending(LocalBoxFuture<'static, Option<String>>),
}

impl Composed {
    /// Returns `true` if the decision is not yet available.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Wait for the decision.
    pub async fn resolve(self) -> Option<String> {
        match self {
            Self::Ready(error) => error,
            Self::Pending(pending) => pending.await,
        }
    }
}

impl std::fmt::Debug for Composed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(error) => f.debug_tuple("Ready").field(error).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Run `validators` against `value`.
///
/// # Panics
///
/// Panics if a validator returns an error object with an empty message.
/// Discarding pending validators uses `tokio::task::spawn_local`, so a list
/// mixing async validators with a synchronous failure must be composed
/// inside a `LocalSet`.
pub fn compose<V>(validators: &[Validator<V>], value: &V) -> Composed {
    let mut pending: Vec<PendingOutcome> = Vec::new();

    for validator in validators {
        match validator(value) {
            Validation::Ready(outcome) => {
                if let Some(error) = outcome.into_error() {
                    detach(pending.into_iter().collect());
                    return Composed::Ready(Some(error));
                }
            }
            Validation::Pending(future) => pending.push(future),
        }
    }

    if pending.is_empty() {
        Composed::Ready(None)
    } else {
        Composed::Pending(race(pending.into_iter().collect()).boxed_local())
    }
}

async fn race(mut racing: FuturesUnordered<PendingOutcome>) -> Option<String> {
    while let Some(outcome) = racing.next().await {
        if let Some(error) = outcome.into_error() {
            detach(racing);
            return Some(error);
        }
    }
    None
}

fn detach(mut rest: FuturesUnordered<PendingOutcome>) {
    if rest.is_empty() {
        return;
    }
    tracing::trace!(count = rest.len(), "detaching discarded validators");
    tokio::task::spawn_local(async move {
        let drained = AssertUnwindSafe(async move {
            while let Some(outcome) = rest.next().await {
                if let ValidationOutcome::Error(error) = &outcome {
                    if error.message.is_empty() {
                        tracing::error!(
                            code = error.code,
                            "discarded validator returned an error object without a message"
                        );
                    }
                }
            }
        })
        .catch_unwind()
        .await;
        if let Err(payload) = drained {
            tracing::error!(message = %panic_message(&*payload), "discarded validator panicked");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validator;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    fn after(ms: u64, message: &'static str) -> Validator<i32> {
        validator(move |_: &i32| {
            Validation::pending(async move {
                sleep(Duration::from_millis(ms)).await;
                message
            })
        })
    }

    #[test]
    fn empty_list_passes_synchronously() {
        let composed = compose::<i32>(&[], &1);
        assert!(matches!(composed, Composed::Ready(None)));
    }

    #[test]
    fn first_sync_failure_in_list_order_wins() {
        let validators = vec![
            validator(|_: &i32| ""),
            validator(|_: &i32| "first"),
            validator(|_: &i32| "second"),
        ];
        match compose(&validators, &0) {
            Composed::Ready(error) => assert_eq!(error.as_deref(), Some("first")),
            Composed::Pending(_) => panic!("expected a synchronous decision"),
        }
    }

    #[test]
    fn validators_after_sync_failure_are_not_invoked() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let validators = vec![
            validator(|_: &i32| "stop"),
            validator(move |_: &i32| {
                counter.set(counter.get() + 1);
                ""
            }),
        ];
        let _ = compose(&validators, &0);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn async_race_first_arrival_wins() {
        LocalSet::new()
            .run_until(async {
                let validators = vec![after(200, "foo"), after(100, "bar")];
                let composed = compose(&validators, &0);
                assert!(composed.is_pending());
                assert_eq!(composed.resolve().await.as_deref(), Some("bar"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn async_passes_are_skipped_in_race() {
        LocalSet::new()
            .run_until(async {
                let validators = vec![after(10, ""), after(50, "late")];
                let composed = compose(&validators, &0);
                assert_eq!(composed.resolve().await.as_deref(), Some("late"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn all_async_passes_pass() {
        LocalSet::new()
            .run_until(async {
                let validators = vec![after(10, ""), after(20, "")];
                assert_eq!(compose(&validators, &0).resolve().await, None);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn sync_failure_discards_earlier_async_but_lets_it_finish() {
        LocalSet::new()
            .run_until(async {
                let finished = Rc::new(Cell::new(false));
                let flag = finished.clone();
                let validators = vec![
                    validator(move |_: &i32| {
                        let flag = flag.clone();
                        Validation::pending(async move {
                            sleep(Duration::from_millis(30)).await;
                            flag.set(true);
                            "async"
                        })
                    }),
                    validator(|_: &i32| "sync"),
                ];
                match compose(&validators, &0) {
                    Composed::Ready(error) => assert_eq!(error.as_deref(), Some("sync")),
                    Composed::Pending(_) => panic!("sync failure must short-circuit"),
                }
                sleep(Duration::from_millis(50)).await;
                assert!(finished.get(), "discarded validator should run to completion");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn race_losers_run_to_completion() {
        LocalSet::new()
            .run_until(async {
                let finished = Rc::new(Cell::new(false));
                let flag = finished.clone();
                let validators = vec![
                    after(10, "fast"),
                    validator(move |_: &i32| {
                        let flag = flag.clone();
                        Validation::pending(async move {
                            sleep(Duration::from_millis(100)).await;
                            flag.set(true);
                            ""
                        })
                    }),
                ];
                assert_eq!(
                    compose(&validators, &0).resolve().await.as_deref(),
                    Some("fast")
                );
                assert!(!finished.get());
                sleep(Duration::from_millis(200)).await;
                assert!(finished.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn misbehaving_discarded_validator_is_logged() {
        LocalSet::new()
            .run_until(async {
                let validators = vec![
                    validator(|_: &i32| {
                        Validation::pending(async {
                            sleep(Duration::from_millis(10)).await;
                            crate::validation::ValidationError::new("broken", "")
                        })
                    }),
                    validator(|_: &i32| "sync"),
                ];
                let _ = compose(&validators, &0);
                sleep(Duration::from_millis(20)).await;
            })
            .await;
        assert!(logs_contain("discarded validator returned an error object without a message"));
    }
}
