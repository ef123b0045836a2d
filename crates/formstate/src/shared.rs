#![forbid(unsafe_code)]

//! Status, error and validator bookkeeping shared by every state that owns
//! validators.
//!
//! The core runs validators against whatever value its owner hands it and
//! applies a result only while the token it ran under is still current.
//! Owners call [`Core::invalidate`] whenever the value they validate changes.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::StateConfig;
use crate::disposable::Disposer;
use crate::state::{DisablePredicate, ValidateStatus};
use crate::validation::{Composed, ValidationEvent, ValidationToken, ValidationTrace, Validator, compose};

/// Observers woken when a state changes in a way they can read.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RefCell<Vec<Weak<Notify>>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: &Rc<Notify>) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|l| l.strong_count() > 0);
        if !entries.iter().any(|l| l.ptr_eq(&Rc::downgrade(listener))) {
            entries.push(Rc::downgrade(listener));
        }
    }

    /// Live listeners, for handing on to newly created children.
    pub(crate) fn live(&self) -> Vec<Rc<Notify>> {
        self.entries.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn notify(&self) {
        for listener in self.live() {
            listener.notify_one();
        }
    }
}

pub(crate) struct Core<V> {
    kind: &'static str,
    activated: Cell<bool>,
    status: Cell<ValidateStatus>,
    own_error: RefCell<Option<String>>,
    validators: RefCell<Vec<Validator<V>>>,
    /// Bumped by every `add_validator`.
    revision: Cell<u64>,
    /// The validator revision the last pass ran with.
    ran_revision: Cell<u64>,
    disable_when: RefCell<Vec<DisablePredicate>>,
    token: Cell<ValidationToken>,
    in_flight: Cell<Option<ValidationToken>>,
    /// Message of a validator panic waiting to be re-raised by `settled`.
    panicked: RefCell<Option<String>>,
    trace: RefCell<Option<ValidationTrace>>,
    created_at: Instant,
    settled: Notify,
    listeners: Listeners,
    disposer: Disposer,
}

impl<V: 'static> Core<V> {
    pub(crate) fn new(kind: &'static str, config: &StateConfig) -> Rc<Self> {
        Rc::new(Self {
            kind,
            activated: Cell::new(false),
            status: Cell::new(ValidateStatus::NotValidated),
            own_error: RefCell::new(None),
            validators: RefCell::new(Vec::new()),
            revision: Cell::new(0),
            ran_revision: Cell::new(0),
            disable_when: RefCell::new(Vec::new()),
            token: Cell::new(ValidationToken::FIRST),
            in_flight: Cell::new(None),
            panicked: RefCell::new(None),
            trace: RefCell::new(config.enable_trace.then(ValidationTrace::new)),
            created_at: Instant::now(),
            settled: Notify::new(),
            listeners: Listeners::default(),
            disposer: Disposer::new(),
        })
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }

    pub(crate) fn disposer(&self) -> &Disposer {
        &self.disposer
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposer.is_disposed()
    }

    pub(crate) fn token(&self) -> ValidationToken {
        self.token.get()
    }

    pub(crate) fn trace(&self) -> Option<ValidationTrace> {
        self.trace.borrow().clone()
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Wake observers.
    pub(crate) fn changed(&self) {
        self.listeners.notify();
    }

    pub(crate) fn add_validator(&self, validator: Validator<V>) {
        self.validators.borrow_mut().push(validator);
        self.revision.set(self.revision.get() + 1);
    }

    /// A pass ran or is running, but validators were added since it started.
    pub(crate) fn validators_changed(&self) -> bool {
        self.status.get() != ValidateStatus::NotValidated
            && self.ran_revision.get() != self.revision.get()
    }

    pub(crate) fn add_disable_when(&self, predicate: DisablePredicate) {
        self.disable_when.borrow_mut().push(predicate);
    }

    pub(crate) fn disabled(&self) -> bool {
        // Predicates may read other states; don't hold the borrow.
        let predicates = self.disable_when.borrow().clone();
        predicates.iter().any(|p| p())
    }

    pub(crate) fn activated(&self) -> bool {
        self.activated.get()
    }

    pub(crate) fn activate(&self) {
        if !self.activated.replace(true) {
            tracing::trace!(kind = self.kind, "activated");
            self.changed();
        }
    }

    /// Status as observed by consumers.
    pub(crate) fn status(&self) -> ValidateStatus {
        if self.disabled() {
            ValidateStatus::WontValidate
        } else {
            self.status.get()
        }
    }

    /// Status ignoring disable predicates.
    pub(crate) fn raw_status(&self) -> ValidateStatus {
        self.status.get()
    }

    pub(crate) fn own_error(&self) -> Option<String> {
        if self.disabled() {
            None
        } else {
            self.own_error.borrow().clone()
        }
    }

    /// The validated value changed: issue a new token and forget the old
    /// result.
    pub(crate) fn invalidate(&self) {
        let next = self.token.get().next();
        if let Some(running) = self.in_flight.take() {
            self.record(|elapsed_ns| ValidationEvent::Superseded {
                token: running,
                superseded_by: next,
                elapsed_ns,
            });
        }
        self.token.set(next);
        self.status.set(ValidateStatus::NotValidated);
        self.own_error.replace(None);
        self.panicked.replace(None);
        self.settled.notify_waiters();
        self.changed();
    }

    /// Run the validators against `value` under the current token.
    pub(crate) fn run(self: &Rc<Self>, value: &V) {
        if self.is_disposed() {
            return;
        }
        let token = self.token.get();
        self.status.set(ValidateStatus::Validating);
        self.in_flight.set(Some(token));
        self.ran_revision.set(self.revision.get());
        self.panicked.replace(None);
        self.record(|elapsed_ns| ValidationEvent::Started { token, elapsed_ns });
        tracing::trace!(kind = self.kind, %token, "validation started");
        self.changed();

        let validators = self.validators.borrow().clone();
        match compose(&validators, value) {
            Composed::Ready(error) => self.finish(token, error),
            Composed::Pending(pending) => {
                let core = Rc::downgrade(self);
                tokio::task::spawn_local(async move {
                    let outcome = AssertUnwindSafe(pending).catch_unwind().await;
                    let Some(core) = core.upgrade() else {
                        return;
                    };
                    match outcome {
                        Ok(error) => core.finish(token, error),
                        Err(payload) => core.fail(token, &*payload),
                    }
                });
            }
        }
    }

    /// Re-run against `value` if validators were added since the last pass.
    pub(crate) fn rerun_if_validators_changed(self: &Rc<Self>, value: &V) {
        if self.is_disposed() || !self.validators_changed() {
            return;
        }
        tracing::trace!(kind = self.kind, "validators added since last pass");
        self.invalidate();
        self.run(value);
    }

    fn finish(&self, token: ValidationToken, error: Option<String>) {
        if self.is_disposed() {
            return;
        }
        let current = self.token.get();
        if token != current {
            self.record(|elapsed_ns| ValidationEvent::StaleDiscarded {
                token,
                current_token: current,
                elapsed_ns,
            });
            tracing::debug!(
                kind = self.kind,
                %token,
                current = %current,
                "discarding stale validation result"
            );
            return;
        }
        self.in_flight.set(None);
        self.record(|elapsed_ns| ValidationEvent::Applied {
            token,
            is_valid: error.is_none(),
            elapsed_ns,
        });
        tracing::trace!(kind = self.kind, %token, has_error = error.is_some(), "validation applied");
        self.own_error.replace(error);
        self.status.set(ValidateStatus::Validated);
        self.settled.notify_waiters();
        self.changed();
    }

    /// An async validator panicked. Release waiters so they can re-raise it.
    fn fail(&self, token: ValidationToken, payload: &(dyn Any + Send)) {
        let message = panic_message(payload);
        tracing::error!(kind = self.kind, %token, %message, "validator panicked");
        if self.is_disposed() || token != self.token.get() {
            return;
        }
        self.in_flight.set(None);
        self.status.set(ValidateStatus::NotValidated);
        self.panicked.replace(Some(message));
        self.settled.notify_waiters();
        self.changed();
    }

    pub(crate) fn reset(&self) {
        self.activated.set(false);
        self.invalidate();
    }

    /// Resolves once the status is no longer `Validating`, or the core is
    /// disabled or disposed.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from an async validator of the current pass.
    pub(crate) async fn settled(self: Rc<Self>) {
        loop {
            let notified = self.settled.notified();
            if let Some(message) = self.panicked.borrow().clone() {
                panic!("{message}");
            }
            if self.is_disposed()
                || self.disabled()
                || self.status.get() != ValidateStatus::Validating
            {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        tracing::debug!(kind = self.kind, "disposing");
        self.disposer.dispose();
        if self.status.get() == ValidateStatus::Validating {
            self.status.set(ValidateStatus::NotValidated);
        }
        self.in_flight.set(None);
        self.settled.notify_waiters();
        self.changed();
    }

    fn record(&self, event: impl FnOnce(u64) -> ValidationEvent) {
        if let Some(trace) = self.trace.borrow_mut().as_mut() {
            let elapsed = Instant::now().saturating_duration_since(self.created_at);
            trace.push(event(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)));
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "validator panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{Validation, validator};
    use std::time::Duration;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    fn traced() -> StateConfig {
        StateConfig::default().with_trace(true)
    }

    #[test]
    fn sync_run_settles_immediately() {
        let core = Core::<i32>::new("test", &traced());
        core.add_validator(validator(|v: &i32| if *v < 0 { "negative" } else { "" }));
        core.run(&-1);
        assert_eq!(core.status(), ValidateStatus::Validated);
        assert_eq!(core.own_error().as_deref(), Some("negative"));

        core.invalidate();
        assert_eq!(core.status(), ValidateStatus::NotValidated);
        assert_eq!(core.own_error(), None);
    }

    #[test]
    fn disable_predicate_overlays_status_and_error() {
        let core = Core::<i32>::new("test", &StateConfig::default());
        core.add_validator(validator(|_: &i32| "always"));
        core.run(&0);
        let flag = Rc::new(Cell::new(true));
        let gate = flag.clone();
        core.add_disable_when(Rc::new(move || gate.get()));
        assert_eq!(core.status(), ValidateStatus::WontValidate);
        assert_eq!(core.own_error(), None);
        flag.set(false);
        assert_eq!(core.own_error().as_deref(), Some("always"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_async_result_is_discarded() {
        LocalSet::new()
            .run_until(async {
                let core = Core::<i32>::new("test", &traced());
                core.add_validator(validator(|v: &i32| {
                    let v = *v;
                    Validation::pending(async move {
                        sleep(Duration::from_millis(if v == 1 { 100 } else { 10 })).await;
                        format!("bad {v}")
                    })
                }));
                core.run(&1);
                let first = core.token();
                core.invalidate();
                core.run(&2);
                core.clone().settled().await;
                assert_eq!(core.own_error().as_deref(), Some("bad 2"));

                sleep(Duration::from_millis(200)).await;
                assert_eq!(core.own_error().as_deref(), Some("bad 2"));
                let trace = core.trace().expect("trace enabled");
                assert!(trace.contains_event_type(first, "superseded"));
                assert!(trace.contains_event_type(first, "stale_discarded"));
                assert!(trace.verify_invariants().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn stale_discard_is_logged() {
        LocalSet::new()
            .run_until(async {
                let core = Core::<i32>::new("logged", &StateConfig::default());
                core.add_validator(validator(|_: &i32| {
                    Validation::pending(async {
                        sleep(Duration::from_millis(10)).await;
                        "late"
                    })
                }));
                core.run(&0);
                core.invalidate();
                sleep(Duration::from_millis(20)).await;
            })
            .await;
        assert!(logs_contain("discarding stale validation result"));
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_releases_waiters() {
        LocalSet::new()
            .run_until(async {
                let core = Core::<i32>::new("test", &StateConfig::default());
                core.add_validator(validator(|_: &i32| {
                    Validation::pending(futures::future::pending::<&str>())
                }));
                core.run(&0);
                assert_eq!(core.status(), ValidateStatus::Validating);
                let waiter = tokio::task::spawn_local(core.clone().settled());
                tokio::task::yield_now().await;
                core.dispose();
                waiter.await.expect("waiter completes");
                assert_eq!(core.status(), ValidateStatus::NotValidated);
            })
            .await;
    }

    #[test]
    fn added_validator_reruns_only_on_request() {
        let core = Core::<i32>::new("test", &StateConfig::default());
        core.run(&1);
        assert!(!core.validators_changed());
        core.add_validator(validator(|_: &i32| "late"));
        assert!(core.validators_changed());
        assert_eq!(core.own_error(), None);

        core.rerun_if_validators_changed(&1);
        assert_eq!(core.own_error().as_deref(), Some("late"));
        assert!(!core.validators_changed());
    }

    #[test]
    fn listeners_wake_on_status_changes() {
        let core = Core::<i32>::new("test", &StateConfig::default());
        let listener = Rc::new(Notify::new());
        core.listeners().add(&listener);
        core.listeners().add(&listener);
        assert_eq!(core.listeners().live().len(), 1);
        core.run(&0);
        let woken = futures::FutureExt::now_or_never(listener.notified());
        assert!(woken.is_some());
        drop(listener);
        assert!(core.listeners().live().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn async_validator_panic_releases_waiters_and_reraises() {
        LocalSet::new()
            .run_until(async {
                let core = Core::<i32>::new("test", &StateConfig::default());
                core.add_validator(validator(|_: &i32| {
                    Validation::pending(async {
                        sleep(Duration::from_millis(5)).await;
                        crate::validation::ValidationError::new("broken", "")
                    })
                }));
                core.run(&0);
                let waited = std::panic::AssertUnwindSafe(core.clone().settled())
                    .catch_unwind()
                    .await;
                let payload = waited.expect_err("settled must re-raise");
                assert!(panic_message(&*payload).contains("non-empty message"));
                assert_eq!(core.raw_status(), ValidateStatus::NotValidated);
            })
            .await;
    }
}
