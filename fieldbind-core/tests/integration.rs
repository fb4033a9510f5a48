//! Integration Tests for Fields
//!
//! These tests verify that fields, bindings, transformers and models work
//! together through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use fieldbind_core::prelude::*;
use fieldbind_core::reactive::{ObserverId, Observer};

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/// Writing the value a field already holds notifies nobody, but still
/// counts as an update.
#[test]
fn same_value_write_notifies_once() {
    let name = Field::<String>::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    name.add_observer_fn(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    calls.store(0, Ordering::SeqCst);

    name.set("Bob".into());
    let changed_at = name.changed_at();
    let first_update = name.updated_at();

    name.set("Bob".into());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(name.changed_at(), changed_at);
    assert!(name.updated_at() >= first_update);
    assert_eq!(name.load_state(), LoadState::Set);
}

/// A rule runs once across repeated validations until the next write.
#[test]
fn validation_is_memoized() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = runs.clone();
    let age = Field::<u32>::new().with_value(20).require(
        move |age| {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            *age >= 18
        },
        "must be an adult",
    );

    for _ in 0..5 {
        assert!(age.validate().is_valid());
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    age.set(12);
    assert_eq!(
        age.validate(),
        ValidationState::Invalid(vec!["must be an adult".into()])
    );
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    age.reset_validation_state();
    age.validate();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn rules_compose() {
    let username = Field::<String>::new()
        .require_not_nil()
        .require_rule(LengthRule::new(Some(3), Some(8)))
        .require_rule(NotBlankRule);
    assert_eq!(username.validate().messages(), ["is required"]);

    username.set("  ".into());
    assert_eq!(
        username.validate().messages(),
        ["Value must be greater than 3", "must not be blank"]
    );

    username.set("ada_l".into());
    assert!(username.is_valid());

    username.add_validation_error("is taken");
    assert_eq!(username.validation_state().messages(), ["is taken"]);
}

#[test]
fn payload_round_trip_and_explicit_null() {
    let nickname = Field::<String>::new().with_key("nickname");
    let score = Field::<f64>::new().with_key("score");

    let input = payload(json!({ "nickname": "Ace", "score": 2 }));
    nickname.read_from(&input);
    score.read_from(&input);
    assert_eq!(nickname.value().as_deref(), Some("Ace"));
    assert_eq!(score.value(), Some(2.0));

    let mut out = Payload::new();
    nickname.export_into(&mut out, false);
    score.export_into(&mut out, false);
    assert_eq!(Value::Object(out), json!({ "nickname": "Ace", "score": 2.0 }));

    nickname.clear();
    let mut implicit = Payload::new();
    nickname.export_into(&mut implicit, false);
    assert!(!implicit.contains_key("nickname"));

    let mut explicit = Payload::new();
    nickname.export_into(&mut explicit, true);
    assert_eq!(explicit.get("nickname"), Some(&Value::Null));
}

/// Mutual binding converges on the right side's value and settles.
#[test]
fn mutual_binding_converges() {
    let a = Field::<String>::new().with_value("John".into());
    let b = Field::<String>::new().with_value("Bob".into());

    bind_mutual(&a, &b);
    assert_eq!(a.value().as_deref(), Some("Bob"));
    assert_eq!(b.value().as_deref(), Some("Bob"));

    a.set("Martha".into());
    assert_eq!(b.value().as_deref(), Some("Martha"));

    b.set("Ruth".into());
    assert_eq!(a.value().as_deref(), Some("Ruth"));
}

#[test]
fn mutual_binding_can_converge_left() {
    let a = Field::<i32>::new().with_value(1);
    let b = Field::<i32>::new().with_value(2);

    bind_mutual_with(&a, &b, Converge::Left);
    assert_eq!(a.value(), Some(1));
    assert_eq!(b.value(), Some(1));
}

/// Assigning a literal stops a field from following its source.
#[test]
fn assigning_a_literal_breaks_the_binding() {
    let c = Field::<String>::new().with_value("Alice".into());
    let d = Field::<String>::new().with_value("Joan".into());

    bind_from(&c, &d);
    assert_eq!(c.value(), d.value());

    c.assign(Some("Kevin".into()));
    d.set("Rebecca".into());
    assert_eq!(c.value().as_deref(), Some("Kevin"));

    bind_from(&c, &d);
    assert_eq!(c.value().as_deref(), Some("Rebecca"));
}

#[test]
fn assigning_one_side_of_mutual_binding_still_propagates_out() {
    let a = Field::<i32>::new().with_value(1);
    let b = Field::<i32>::new().with_value(1);
    bind_mutual(&a, &b);

    a.assign(Some(5));
    assert_eq!(b.value(), Some(5));

    b.set(6);
    assert_eq!(a.value(), Some(5));
}

#[test]
fn observe_and_unobserve() {
    let source = Field::<i32>::new().with_value(1);
    let target = Field::<i32>::new();

    observe(&source, &target);
    assert_eq!(target.value(), Some(1));

    unobserve(&source, &target);
    source.set(2);
    assert_eq!(target.value(), Some(1));

    // Removing again is a no-op.
    unobserve(&source, &target);
}

/// A chained transformation keeps feeding its downstream field.
#[test]
fn chained_transformation_keeps_updating() {
    let a = Field::<String>::new().with_value("ada".into());
    let b = Field::<String>::new();

    let upper = chain(&a, |name: Option<&String>| name.map(|n| n.to_uppercase()));
    upper.add_observer(&b);
    assert_eq!(b.value().as_deref(), Some("ADA"));

    a.set("grace".into());
    assert_eq!(b.value().as_deref(), Some("GRACE"));

    a.set("linus".into());
    assert_eq!(b.value().as_deref(), Some("LINUS"));
    assert_eq!(upper.value().as_deref(), Some("LINUS"));
}

#[test]
fn transformations_chain_further() {
    let celsius = Field::<f64>::new().with_value(100.0);
    let label = Field::<String>::new();

    celsius
        .map(|c| c.map(|c| c * 9.0 / 5.0 + 32.0))
        .map(|f: Option<&f64>| f.map(|f| format!("{f}°F")))
        .add_observer(&label);
    assert_eq!(label.value().as_deref(), Some("212°F"));

    celsius.set(0.0);
    assert_eq!(label.value().as_deref(), Some("32°F"));
}

#[test]
fn array_field_reports_deltas() {
    let added = Arc::new(Mutex::new(Vec::new()));
    let removed = Arc::new(Mutex::new(Vec::new()));
    let added_sink = added.clone();
    let removed_sink = removed.clone();

    let numbers = Field::<i32>::new()
        .into_array()
        .with_value(vec![1, 2, 3])
        .on_value_added(move |v| added_sink.lock().push(*v))
        .on_value_removed(move |v| removed_sink.lock().push(*v));

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    numbers.add_observer_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    notifications.store(0, Ordering::SeqCst);

    numbers.set(vec![2, 3, 4]);
    assert_eq!(*removed.lock(), vec![1]);
    assert_eq!(*added.lock(), vec![4]);
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

struct Label {
    id: ObserverId,
    text: Mutex<Option<String>>,
}

impl Observer<String> for Label {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn value_changed(&self, value: Option<String>, _source: ObserverId) {
        *self.text.lock() = value;
    }
}

/// A new anonymous closure replaces the previous one without affecting
/// object observers.
#[test]
fn anonymous_closure_replacement() {
    let name = Field::<String>::new();
    let label = Arc::new(Label {
        id: ObserverId::new(),
        text: Mutex::new(None),
    });
    name.add_observer(&label);

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let first_clone = first.clone();
    let second_clone = second.clone();
    name.add_observer_fn(move |_| {
        first_clone.fetch_add(1, Ordering::SeqCst);
    });
    name.add_observer_fn(move |_| {
        second_clone.fetch_add(1, Ordering::SeqCst);
    });

    name.set("Alice".into());
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 2);
    assert_eq!(label.text.lock().as_deref(), Some("Alice"));
    assert_eq!(name.observations().len(), 2);
}

#[test]
fn dropped_observer_is_skipped_silently() {
    let name = Field::<String>::new();
    let label = Arc::new(Label {
        id: ObserverId::new(),
        text: Mutex::new(None),
    });
    name.add_observer(&label);
    drop(label);

    name.set("Nobody listens".into());
    assert!(name.observations().is_empty());
}

#[test]
fn owner_keyed_closures_are_independent() {
    let name = Field::<String>::new();
    let owner = Field::<String>::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    name.add_observer_with_owner(&owner, move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    name.add_observer_fn(|_| {});
    name.set("x".into());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    name.remove_all_observers();
    name.set("y".into());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn dates_through_a_field() {
    let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
    let born = Field::<DateTime<Utc>>::new()
        .with_key("born")
        .transform(DateTransformer::new("%Y-%m-%d").with_zone(eastern));

    born.set(DateTime::<Utc>::from_timestamp(0, 0).unwrap());
    let mut out = Payload::new();
    born.export_into(&mut out, false);
    assert_eq!(out.get("born"), Some(&json!("1969-12-31")));

    born.read_from(&payload(json!({ "born": "2000-02-29" })));
    assert_eq!(
        born.value().map(|d| d.to_rfc3339()),
        Some("2000-02-29T05:00:00+00:00".to_string())
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Green,
}

impl RawRepresentable for Color {
    type Raw = String;

    fn raw_value(&self) -> String {
        match self {
            Color::Red => "red".into(),
            Color::Green => "green".into(),
        }
    }

    fn from_raw(raw: String) -> Option<Self> {
        match raw.as_str() {
            "red" => Some(Color::Red),
            "green" => Some(Color::Green),
            _ => None,
        }
    }
}

#[test]
fn enum_field_uses_raw_values() {
    let color = EnumField::<Color>::enumeration().with_key("color");
    color.read_from(&payload(json!({ "color": "green" })));
    assert_eq!(color.value(), Some(Color::Green));

    color.read_from(&payload(json!({ "color": "purple" })));
    assert_eq!(color.value(), None);

    color.set(Color::Red);
    assert_eq!(color.export_value(false), Some(json!("red")));
}

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i64,
    y: i64,
}

impl ValueTransformable for Point {
    fn value_transformer() -> ValueTransformer<Self> {
        ValueTransformer::new(
            |value| {
                let text = value.as_str()?;
                let (x, y) = text.split_once(',')?;
                Some(Point {
                    x: x.trim().parse().ok()?,
                    y: y.trim().parse().ok()?,
                })
            },
            |point| Some(json!(format!("{},{}", point.x, point.y))),
        )
    }
}

#[test]
fn automatic_field_uses_type_transformer() {
    let origin = Field::<Point>::automatic().with_key("at");
    origin.read_from(&payload(json!({ "at": "3, 4" })));
    assert_eq!(origin.value(), Some(Point { x: 3, y: 4 }));
    assert_eq!(origin.export_value(false), Some(json!("3,4")));
}

struct Account {
    email: Field<String>,
    tags: ArrayField<String>,
    owner: ModelField<Account>,
}

impl Account {
    fn new() -> Self {
        Self {
            email: Field::<String>::new()
                .with_key("email")
                .require_not_nil()
                .require(|email| email.contains('@'), "must be an email address"),
            tags: Field::<String>::new()
                .with_key("tags")
                .require_rule(NotBlankRule)
                .into_array(),
            owner: ModelField::<Account>::new().with_key("owner"),
        }
    }
}

impl FieldModel for Account {
    fn fields(&self) -> Vec<&dyn FieldType> {
        vec![&self.email, &self.tags, &self.owner]
    }
}

#[test]
fn model_round_trip_and_validation() {
    let account = Account::new();
    account
        .read_json(r#"{ "email": "ada@example.com", "tags": ["admin", " "] }"#)
        .unwrap();
    assert_eq!(account.tags.value(), Some(vec!["admin".to_string(), " ".to_string()]));

    assert!(!account.validate_all());
    let errors = account.validation_errors();
    assert_eq!(errors.get("tags"), Some(&vec!["must not be blank".to_string()]));
    assert!(!errors.contains_key("email"));

    let json = account.to_json(ExportOptions::default()).unwrap();
    let parsed: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed,
        json!({ "email": "ada@example.com", "tags": ["admin", " "] })
    );
}

#[test]
fn self_referencing_model_export_terminates() {
    let account = ModelRef::new(Account::new());
    account.email.set("root@example.com".into());
    account.owner.set(account.clone());

    let exported = account.to_payload(ExportOptions::default());
    assert_eq!(
        Value::Object(exported),
        json!({
            "email": "root@example.com",
            "tags": [],
            "owner": {
                "email": "root@example.com",
                "tags": [],
                "owner": {}
            }
        })
    );

    account.owner.clear();
}

#[test]
fn untyped_bridge() {
    let account = Account::new();
    let email: &dyn FieldType = &account.email;

    assert!(email.set_any_value(Some(Box::new("a@b.c".to_string()))));
    assert_eq!(account.email.value().as_deref(), Some("a@b.c"));

    assert!(!email.set_any_value(Some(Box::new(12_u8))));
    assert_eq!(account.email.value().as_deref(), Some("a@b.c"));

    assert!(email.set_any_value(None));
    assert_eq!(account.email.value(), None);
}

#[tokio::test]
async fn async_load_drives_load_state() {
    let profile = Field::<String>::new();

    let loaded = profile
        .load(async { Ok::<_, std::io::Error>(Some("loaded".to_string())) })
        .await;
    assert!(loaded.is_ok());
    assert_eq!(profile.load_state(), LoadState::Set);
    assert_eq!(profile.value().as_deref(), Some("loaded"));

    let failed = profile
        .load(async {
            Err::<Option<String>, _>(std::io::Error::new(std::io::ErrorKind::Other, "offline"))
        })
        .await;
    assert!(failed.is_err());
    assert_eq!(profile.load_state(), LoadState::Error);
    assert_eq!(profile.value().as_deref(), Some("loaded"));
}
