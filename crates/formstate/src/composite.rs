#![forbid(unsafe_code)]

//! Aggregation shared by the keyed and ordered composites.
//!
//! Nothing here is cached. Every read walks the children, so the aggregate
//! can never disagree with them. Own validation is driven by those same
//! reads: an activated composite whose aggregate value moved since its own
//! validators last ran starts a new pass before answering.
//!
//! Activation latches only when the composite is read or validated. A child
//! that is activated and then reset before any read of its parent leaves the
//! parent unactivated.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture, join_all};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::StateConfig;
use crate::shared::Core;
use crate::state::{Validatable, ValidateResult, ValidateStatus};

/// Combine an own status with child statuses.
///
/// Children reporting `WontValidate` neither block nor count.
pub fn aggregate_status(
    own: ValidateStatus,
    children: impl IntoIterator<Item = ValidateStatus>,
) -> ValidateStatus {
    if own == ValidateStatus::WontValidate {
        return ValidateStatus::WontValidate;
    }
    let children: Vec<ValidateStatus> = children
        .into_iter()
        .filter(|s| *s != ValidateStatus::WontValidate)
        .collect();
    if own == ValidateStatus::Validating || children.contains(&ValidateStatus::Validating) {
        ValidateStatus::Validating
    } else if own == ValidateStatus::Validated
        && children.iter().all(|s| *s == ValidateStatus::Validated)
    {
        ValidateStatus::Validated
    } else {
        ValidateStatus::NotValidated
    }
}

pub(crate) struct CompositeCore<V> {
    pub(crate) core: Rc<Core<V>>,
    /// Aggregate value the own validators last ran against.
    checked: RefCell<Option<V>>,
    touched: Cell<bool>,
    changed_at: Cell<Instant>,
}

impl<V: Clone + PartialEq + 'static> CompositeCore<V> {
    pub(crate) fn new(kind: &'static str, config: &StateConfig) -> Self {
        Self {
            core: Core::new(kind, config),
            checked: RefCell::new(None),
            touched: Cell::new(false),
            changed_at: Cell::new(Instant::now()),
        }
    }

    /// A composite-level `set`.
    pub(crate) fn mark_touched(&self) {
        self.touched.set(true);
        self.changed_at.set(Instant::now());
        self.core.changed();
    }

    /// Hand this composite's listeners to a newly created child.
    pub(crate) fn adopt(&self, child: &dyn Validatable) {
        for listener in self.core.listeners().live() {
            child.subscribe(&listener);
        }
    }

    /// Children were added, removed or reordered.
    pub(crate) fn mark_structural(&self) {
        self.mark_touched();
        self.core.activate();
        tracing::debug!(kind = self.core.kind(), "structural edit");
    }

    pub(crate) fn reset(&self) {
        self.checked.replace(None);
        self.touched.set(false);
        self.changed_at.set(Instant::now());
        self.core.reset();
    }
}

/// A state built from child states.
///
/// Activation is observed, not pushed: [`refresh`](Self::refresh) latches it
/// from the children on each read, so a parent only becomes activated if it
/// is read or validated while some child is activated.
pub(crate) trait Composite: Clone + 'static {
    type Value: Clone + PartialEq + 'static;

    fn composite(&self) -> &CompositeCore<Self::Value>;

    fn aggregate_value(&self) -> Self::Value;

    /// Visit children in declaration or index order.
    fn visit_children(&self, f: &mut dyn FnMut(&dyn Validatable));

    fn refresh(&self) {
        let composite = self.composite();
        let core = &composite.core;
        if core.is_disposed() {
            return;
        }
        if !core.activated() {
            let mut any = false;
            self.visit_children(&mut |child| any = any || child.activated());
            if !any {
                return;
            }
            core.activate();
        }
        let value = self.aggregate_value();
        let stale = composite.checked.borrow().as_ref() != Some(&value);
        if stale {
            composite.checked.replace(Some(value.clone()));
            core.invalidate();
        }
        if core.raw_status() == ValidateStatus::NotValidated {
            core.run(&value);
        }
    }

    fn aggregate_status(&self) -> ValidateStatus {
        self.refresh();
        let mut children = Vec::new();
        self.visit_children(&mut |child| children.push(child.validate_status()));
        aggregate_status(self.composite().core.status(), children)
    }

    fn aggregate_own_error(&self) -> Option<String> {
        self.refresh();
        self.composite().core.own_error()
    }

    fn aggregate_error(&self) -> Option<String> {
        self.refresh();
        let core = &self.composite().core;
        if core.disabled() {
            return None;
        }
        if let Some(error) = core.own_error() {
            return Some(error);
        }
        let mut first = None;
        self.visit_children(&mut |child| {
            if first.is_none() {
                first = child.error();
            }
        });
        first
    }

    fn aggregate_activated(&self) -> bool {
        self.refresh();
        self.composite().core.activated()
    }

    fn aggregate_touched(&self) -> bool {
        let mut touched = self.composite().touched.get();
        self.visit_children(&mut |child| touched = touched || child.touched());
        touched
    }

    fn aggregate_changed_at(&self) -> Instant {
        let mut latest = self.composite().changed_at.get();
        self.visit_children(&mut |child| latest = latest.max(child.changed_at()));
        latest
    }

    fn subscribe_all(&self, listener: &Rc<Notify>) {
        self.composite().core.listeners().add(listener);
        self.visit_children(&mut |child| child.subscribe(listener));
    }

    fn flush_children(&self) {
        self.visit_children(&mut |child| child.flush());
    }

    fn dispose_all(&self) {
        if self.composite().core.is_disposed() {
            return;
        }
        self.visit_children(&mut |child| child.dispose());
        self.composite().core.dispose();
    }

    fn child_validations(&self) -> Vec<LocalBoxFuture<'static, Option<String>>> {
        let mut pending = Vec::new();
        self.visit_children(&mut |child| pending.push(child.validate_error()));
        pending
    }

    /// Validate every child concurrently together with the own validators.
    fn validate_all(&self) -> LocalBoxFuture<'static, ValidateResult<Self::Value>> {
        let children = self.child_validations();
        let core = self.composite().core.clone();
        if !core.is_disposed() {
            core.activate();
        }
        self.refresh();
        core.rerun_if_validators_changed(&self.aggregate_value());
        let this = self.clone();
        async move {
            join_all(children).await;
            loop {
                let core = this.composite().core.clone();
                if core.is_disposed() || this.aggregate_status() != ValidateStatus::Validating {
                    break;
                }
                if core.raw_status() == ValidateStatus::Validating {
                    core.settled().await;
                } else {
                    join_all(this.child_validations()).await;
                }
            }
            match this.aggregate_error() {
                Some(error) => ValidateResult::Invalid(error),
                None => ValidateResult::Valid(this.aggregate_value()),
            }
        }
        .boxed_local()
    }
}
