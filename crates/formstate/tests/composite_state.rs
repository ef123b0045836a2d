#![forbid(unsafe_code)]

//! Keyed and ordered composites: aggregation, reconciliation, reset.

use std::future::Future;
use std::time::Duration;

use formstate::validation::{Validation, ValidationError};
use formstate::{
    ArrayFormState, DebouncedState, FieldGroup, FieldState, FormState, State, StateError,
    TransformedState, Validatable, ValidateResult, ValidateStatus,
};
use indexmap::IndexMap;
use tokio::task::LocalSet;
use tokio::time::sleep;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime");
    LocalSet::new().block_on(&runtime, future)
}

// ---------------------------------------------------------------------------
// A heterogeneous keyed group
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Person {
    name: FieldState<String>,
    age: FieldState<i32>,
}

#[derive(Debug, Clone, PartialEq)]
struct PersonValue {
    name: String,
    age: i32,
}

impl FieldGroup for Person {
    type Value = PersonValue;

    fn value(&self) -> PersonValue {
        PersonValue {
            name: self.name.value(),
            age: self.age.value(),
        }
    }

    fn initial_value(&self) -> PersonValue {
        PersonValue {
            name: self.name.initial_value(),
            age: self.age.initial_value(),
        }
    }

    fn set(&self, value: PersonValue) {
        self.name.set(value.name);
        self.age.set(value.age);
    }

    fn on_change(&self, value: PersonValue) {
        self.name.on_change(value.name);
        self.age.on_change(value.age);
    }

    fn reset_with(&self, value: PersonValue) {
        self.name.reset_with(value.name);
        self.age.reset_with(value.age);
    }

    fn for_each(&self, f: &mut dyn FnMut(&str, &dyn Validatable)) {
        f("name", &self.name);
        f("age", &self.age);
    }
}

fn person() -> FormState<Person> {
    FormState::new(Person {
        name: FieldState::new(String::new()),
        age: FieldState::new(0),
    })
    .with_validator(|v: &PersonValue| if v.age >= 0 { "" } else { "bad age" })
}

#[test]
fn end_to_end_keyed_form() {
    run_local(async {
        let state = person();
        state.fields().name.on_change("Al".into());
        state.fields().age.on_change(-1);
        assert_eq!(state.error(), None);

        sleep(ms(250)).await;
        assert_eq!(state.error().as_deref(), Some("bad age"));
        assert_eq!(
            state.value(),
            PersonValue {
                name: "Al".into(),
                age: -1
            }
        );
        assert!(state.activated());
        assert!(state.touched());
        assert_eq!(state.validate_status(), ValidateStatus::Validated);
    });
}

#[test]
fn keyed_validate_flushes_and_aggregates() {
    run_local(async {
        let state = person();
        state.fields().name.add_validator(formstate::validation::validator(|v: &String| {
            if v.is_empty() { "name required" } else { "" }
        }));
        state.fields().age.on_change(3);

        let result = state.validate().await;
        assert_eq!(result, ValidateResult::Invalid("name required".into()));
        assert_eq!(state.fields().age.value(), 3);
        assert!(state.fields().name.activated());

        state.fields().name.on_change("Bo".into());
        let result = state.validate().await;
        assert_eq!(
            result.value(),
            Some(&PersonValue {
                name: "Bo".into(),
                age: 3
            })
        );
    });
}

#[test]
fn keyed_status_waits_for_slowest_child() {
    run_local(async {
        let fields: IndexMap<String, FieldState<i32>> = ["fast", "slow"]
            .into_iter()
            .map(|key| {
                let latency = if key == "fast" { 10 } else { 100 };
                let field = FieldState::with_delay(0, Duration::ZERO).with_validator(move |_: &i32| {
                    Validation::pending(async move {
                        sleep(ms(latency)).await;
                        ""
                    })
                });
                (key.to_owned(), field)
            })
            .collect();
        let form = FormState::new(fields);
        form.fields()["fast"].on_change(1);
        form.fields()["slow"].on_change(1);
        assert_eq!(form.validate_status(), ValidateStatus::Validating);
        sleep(ms(50)).await;
        assert_eq!(form.validate_status(), ValidateStatus::Validating);
        sleep(ms(60)).await;
        assert_eq!(form.validate_status(), ValidateStatus::Validated);
    });
}

#[test]
fn keyed_reset_twice_equals_once() {
    run_local(async {
        let state = person();
        state.fields().age.on_change(-4);
        state.fields().name.on_change("Zed".into());
        sleep(ms(250)).await;
        assert!(state.has_error());

        state.reset();
        let once = (
            state.value(),
            state.touched(),
            state.activated(),
            state.validate_status(),
            state.error(),
        );
        state.reset();
        let twice = (
            state.value(),
            state.touched(),
            state.activated(),
            state.validate_status(),
            state.error(),
        );
        assert_eq!(once, twice);
        assert_eq!(once.0, state.initial_value());
        assert!(!once.1);
        assert!(!once.2);
        assert_eq!(once.3, ValidateStatus::NotValidated);
        assert_eq!(once.4, None);
    });
}

#[test]
fn disabled_form_hides_child_errors() {
    run_local(async {
        let state = person().disable_when(|| true);
        state.fields().age.on_change(-1);
        sleep(ms(250)).await;
        assert_eq!(state.validate_status(), ValidateStatus::WontValidate);
        assert_eq!(state.error(), None);
        assert_eq!(state.validate().await, ValidateResult::Valid(state.value()));
    });
}

// ---------------------------------------------------------------------------
// Ordered composites
// ---------------------------------------------------------------------------

fn scores(initial: &[i32]) -> ArrayFormState<FieldState<i32>> {
    ArrayFormState::new(initial.to_vec(), |v| {
        FieldState::with_delay(v, Duration::ZERO).with_validator(|v: &i32| {
            Validation::pending({
                let v = *v;
                async move {
                    sleep(ms(20)).await;
                    if v > 100 { "over 100" } else { "" }
                }
            })
        })
    })
}

#[test]
fn ordered_reconcile_preserves_identity_and_in_flight_validation() {
    run_local(async {
        let list = scores(&[1, 2]);
        let first = list.get(0).expect("first");
        let second = list.get(1).expect("second");
        first.on_change(200);
        assert!(first.validating());

        list.on_change(vec![200, 2, 3]);
        assert_eq!(list.len(), 3);
        assert!(list.get(0).expect("first").validating(), "in-flight pass survives");
        assert_eq!(list.get(1).expect("second").value(), second.value());

        sleep(ms(30)).await;
        assert_eq!(first.error().as_deref(), Some("over 100"));
        assert_eq!(list.error().as_deref(), Some("over 100"));
        assert_eq!(list.value(), [200, 2, 3]);
    });
}

#[test]
fn ordered_shrink_disposes_tail() {
    run_local(async {
        let list = scores(&[1, 2, 3, 4]);
        let third = list.get(2).expect("third");
        list.set(vec![9, 9]);
        assert_eq!(list.value(), [9, 9]);
        third.on_change(500);
        sleep(ms(50)).await;
        assert_eq!(third.value(), 3);
        assert_eq!(list.error(), None);
        assert!(list.touched());
    });
}

#[test]
fn ordered_validate_reports_first_failing_index() {
    run_local(async {
        let list = scores(&[1, 101, 102]);
        let result = list.validate().await;
        assert_eq!(result, ValidateResult::Invalid("over 100".into()));
        assert_eq!(list.validate_status(), ValidateStatus::Validated);
        assert_eq!(list.remove(1), Ok(101));
        assert_eq!(list.remove(1), Ok(102));
        assert_eq!(list.validate().await, ValidateResult::Valid(vec![1]));
        assert_eq!(
            list.remove(1),
            Err(StateError::IndexOutOfBounds { index: 1, len: 1 })
        );
    });
}

#[test]
fn ordered_own_validator_sees_aggregate() {
    run_local(async {
        let list = scores(&[1, 2]).with_validator(|v: &Vec<i32>| {
            if v.len() > 3 { "too many" } else { "" }
        });
        list.append(3).expect("append");
        assert_eq!(list.error(), None);
        list.append(4).expect("append");
        assert_eq!(list.own_error().as_deref(), Some("too many"));
        list.reset();
        assert_eq!(list.value(), [1, 2]);
        assert_eq!(list.error(), None);
    });
}

// ---------------------------------------------------------------------------
// Nesting adapters inside composites
// ---------------------------------------------------------------------------

#[test]
fn composites_nest_adapters_and_wrappers() {
    run_local(async {
        let text = FieldState::with_delay("5".to_string(), Duration::ZERO);
        let number = TransformedState::new(
            text,
            |s: &String| s.parse::<i64>().unwrap_or(-1),
            |n: &i64| n.to_string(),
        )
        .with_validator(|n: &i64| if *n < 0 { "not a number" } else { "" });

        let mut fields: IndexMap<String, TransformedState<FieldState<String>, i64>> = IndexMap::new();
        fields.insert("count".into(), number.clone());
        let form = DebouncedState::with_delay(FormState::new(fields), ms(100));

        number.source().on_change("abc".into());
        assert_eq!(form.source().error().as_deref(), Some("not a number"));
        assert_eq!(form.error(), None, "wrapper still shows the settled view");

        sleep(ms(150)).await;
        assert_eq!(form.error().as_deref(), Some("not a number"));
        assert_eq!(form.value()["count"], -1);
    });
}

#[test]
#[should_panic(expected = "non-empty message")]
fn ordered_validate_surfaces_broken_child_validator() {
    run_local(async {
        let list = ArrayFormState::new(vec![1, 2], |v| {
            FieldState::with_delay(v, Duration::ZERO).with_validator(|v: &i32| {
                let v = *v;
                Validation::pending(async move {
                    sleep(ms(10)).await;
                    if v == 2 {
                        ValidationError::new("broken", "")
                    } else {
                        ValidationError::custom("one")
                    }
                })
            })
        });
        list.validate().await;
    });
}

#[test]
fn ordered_validate_applies_validators_added_after_settling() {
    run_local(async {
        let list = scores(&[1, 2]);
        assert_eq!(list.validate().await, ValidateResult::Valid(vec![1, 2]));
        list.add_validator(formstate::validation::validator(|v: &Vec<i32>| {
            if v.iter().sum::<i32>() > 2 { "sum over 2" } else { "" }
        }));
        assert_eq!(list.own_error(), None);
        assert_eq!(
            list.validate().await,
            ValidateResult::Invalid("sum over 2".into())
        );
    });
}
