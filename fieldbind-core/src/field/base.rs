//! BaseField Implementation
//!
//! A BaseField is the value holder every field flavour is built on. It owns
//! an optional value plus the bookkeeping around it: load state, cached
//! validation verdict, timestamps, metadata and observers.
//!
//! # How Writes Work
//!
//! Every write, including a write of the value already held:
//!
//! 1. stores the value, marks the field `Set`, resets validation to
//!    `Unknown` and stamps `updated_at`;
//! 2. runs internal write hooks, then the update handler.
//!
//! Only a write that changes the value (by `PartialEq`) also stamps
//! `changed_at` and notifies observers. That split is what lets two fields
//! observe each other without looping.
//!
//! # Thread Safety
//!
//! State lives behind `parking_lot` locks in a shared interior; handles are
//! cheap clones of an `Arc`. No lock is held while hooks, handlers or
//! observers run.

use std::future::Future;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::{LoadState, ValidationState};
use crate::reactive::{
    AsObserver, Observable, ObservationRegistry, Observer, ObserverHandle, ObserverId, Upstream,
    ValueSource,
};
use crate::validation::ValidationRule;

/// Values a field can hold.
pub trait FieldValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> FieldValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

type UpdateHandler<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;
type WriteHook<T> = Arc<dyn Fn(Option<&T>, Option<&T>) + Send + Sync>;
type NestedCheck<T> = Arc<dyn Fn(Option<&T>) -> Vec<String> + Send + Sync>;

struct Slot<T> {
    value: Option<T>,
    load_state: LoadState,
    validation_state: ValidationState,
    updated_at: Option<DateTime<Utc>>,
    changed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Meta {
    name: Option<String>,
    key: Option<String>,
    priority: i32,
}

/// Shared interior of a field.
pub(crate) struct FieldCore<T> {
    id: ObserverId,
    slot: RwLock<Slot<T>>,
    meta: RwLock<Meta>,
    rules: RwLock<Vec<ValidationRule<T>>>,
    nested_checks: RwLock<Vec<NestedCheck<T>>>,
    observations: ObservationRegistry<T>,
    /// Sources this field observes, keyed by source id.
    upstream: Mutex<IndexMap<ObserverId, Upstream>>,
    on_updated: RwLock<Option<UpdateHandler<T>>>,
    write_hooks: RwLock<Vec<WriteHook<T>>>,
}

impl<T: FieldValue> FieldCore<T> {
    fn new() -> Self {
        Self {
            id: ObserverId::new(),
            slot: RwLock::new(Slot {
                value: None,
                load_state: LoadState::NotSet,
                validation_state: ValidationState::Unknown,
                updated_at: None,
                changed_at: None,
            }),
            meta: RwLock::new(Meta::default()),
            rules: RwLock::new(Vec::new()),
            nested_checks: RwLock::new(Vec::new()),
            observations: ObservationRegistry::new(),
            upstream: Mutex::new(IndexMap::new()),
            on_updated: RwLock::new(None),
            write_hooks: RwLock::new(Vec::new()),
        }
    }

    /// Store `value`; returns whether it differed from the previous one.
    fn write(&self, value: Option<T>) -> bool {
        let now = Utc::now();
        let (previous, changed) = {
            let mut slot = self.slot.write();
            let changed = slot.value != value;
            let previous = std::mem::replace(&mut slot.value, value.clone());
            slot.load_state = LoadState::Set;
            slot.validation_state = ValidationState::Unknown;
            slot.updated_at = Some(now);
            if changed {
                slot.changed_at = Some(now);
            }
            (previous, changed)
        };

        let hooks = self.write_hooks.read().clone();
        for hook in &hooks {
            hook(previous.as_ref(), value.as_ref());
        }

        let handler = self.on_updated.read().clone();
        if let Some(handler) = handler {
            handler(value.as_ref());
        }

        if changed {
            self.observations.notify(self.id, value);
        }
        changed
    }

    fn value(&self) -> Option<T> {
        self.slot.read().value.clone()
    }
}

impl<T: FieldValue> Observer<T> for FieldCore<T> {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn value_changed(&self, value: Option<T>, _source: ObserverId) {
        self.write(value);
    }

    fn attached(&self, upstream: Upstream) {
        self.upstream.lock().insert(upstream.source(), upstream);
    }

    fn detached(&self, source: ObserverId) {
        self.upstream.lock().shift_remove(&source);
    }
}

impl<T: FieldValue> ValueSource<T> for FieldCore<T> {
    fn current_value(&self) -> Option<T> {
        self.value()
    }

    fn registry(&self) -> &ObservationRegistry<T> {
        &self.observations
    }
}

/// A typed, observable value holder.
///
/// # Example
///
/// ```rust,ignore
/// let age = BaseField::<u32>::new()
///     .with_name("Age")
///     .require(|age| *age >= 18, "must be an adult");
///
/// age.set(21);
/// assert!(age.validate().is_valid());
/// ```
pub struct BaseField<T> {
    core: Arc<FieldCore<T>>,
}

impl<T: FieldValue> BaseField<T> {
    /// Create an empty field in the `NotSet` state.
    pub fn new() -> Self {
        Self {
            core: Arc::new(FieldCore::new()),
        }
    }

    /// The field's unique id.
    pub fn id(&self) -> ObserverId {
        self.core.id
    }

    /// The current value.
    pub fn value(&self) -> Option<T> {
        self.core.value()
    }

    /// Borrow the current value. `f` must not write to this field.
    pub fn read<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.core.slot.read().value.as_ref())
    }

    /// Write a value, notifying observers if it changed.
    ///
    /// Returns whether the value changed.
    pub fn set_value(&self, value: Option<T>) -> bool {
        self.core.write(value)
    }

    pub fn set(&self, value: T) -> bool {
        self.set_value(Some(value))
    }

    pub fn clear(&self) -> bool {
        self.set_value(None)
    }

    /// Write a value computed from the current one.
    pub fn update(&self, f: impl FnOnce(&mut Option<T>)) -> bool {
        let mut value = self.value();
        f(&mut value);
        self.set_value(value)
    }

    /// Stop observing every source, then write `value`.
    ///
    /// Use this to give a bound field a value of its own: later changes on
    /// its former sources no longer reach it.
    pub fn assign(&self, value: Option<T>) -> bool {
        self.detach_sources();
        self.set_value(value)
    }

    /// Stop observing every source this field is attached to. Returns the
    /// number of sources detached.
    pub fn detach_sources(&self) -> usize {
        let upstream = std::mem::take(&mut *self.core.upstream.lock());
        for link in upstream.values() {
            link.detach(self.core.id);
        }
        if !upstream.is_empty() {
            tracing::debug!(field = %self.core.id, sources = upstream.len(), "detached from sources");
        }
        upstream.len()
    }

    /// Number of sources this field currently observes.
    pub fn source_count(&self) -> usize {
        self.core.upstream.lock().len()
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn name(&self) -> Option<String> {
        self.core.meta.read().name.clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        self.core.meta.write().name = name;
    }

    /// Payload key; fields without one are skipped by import and export.
    pub fn key(&self) -> Option<String> {
        self.core.meta.read().key.clone()
    }

    pub fn set_key(&self, key: Option<String>) {
        self.core.meta.write().key = key;
    }

    pub fn priority(&self) -> i32 {
        self.core.meta.read().priority
    }

    pub fn set_priority(&self, priority: i32) {
        self.core.meta.write().priority = priority;
    }

    pub fn load_state(&self) -> LoadState {
        self.core.slot.read().load_state
    }

    /// When the field was last written, changed or not.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.core.slot.read().updated_at
    }

    /// When the field's value last changed.
    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        self.core.slot.read().changed_at
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// The cached verdict, without validating.
    pub fn validation_state(&self) -> ValidationState {
        self.core.slot.read().validation_state.clone()
    }

    /// Validate if needed and report whether the field is valid.
    pub fn is_valid(&self) -> bool {
        self.validate().is_valid()
    }

    /// Run the rules against the current value.
    ///
    /// The verdict is cached: rules run again only after a write or
    /// [`BaseField::reset_validation_state`].
    pub fn validate(&self) -> ValidationState {
        {
            let slot = self.core.slot.read();
            if !slot.validation_state.is_unknown() {
                return slot.validation_state.clone();
            }
        }

        let state = ValidationState::from_messages(self.check(self.value().as_ref()));
        self.store_validation(state.clone());
        state
    }

    /// Same as [`BaseField::validate`].
    pub fn validate_if_needed(&self) -> ValidationState {
        self.validate()
    }

    /// Discard the cached verdict and run every rule again.
    pub fn revalidate(&self) -> ValidationState {
        self.reset_validation_state();
        self.validate()
    }

    /// Every failure message for `value`, in rule order, without touching
    /// the cached state.
    pub fn check(&self, value: Option<&T>) -> Vec<String> {
        let rules = self.core.rules.read().clone();
        let mut messages: Vec<String> = rules
            .iter()
            .filter_map(|rule| rule.validate(value).err())
            .collect();

        let nested = self.core.nested_checks.read().clone();
        for check in &nested {
            messages.extend(check(value));
        }
        messages
    }

    /// Record an externally detected failure without running the rules.
    pub fn add_validation_error(&self, message: &str) {
        self.core.slot.write().validation_state.push_error(message);
    }

    /// Forget the cached verdict.
    pub fn reset_validation_state(&self) {
        self.core.slot.write().validation_state = ValidationState::Unknown;
    }

    /// Append a rule.
    pub fn add_rule(&self, rule: impl Into<ValidationRule<T>>) {
        self.core.rules.write().push(rule.into());
    }

    pub fn rule_count(&self) -> usize {
        self.core.rules.read().len()
    }

    pub(crate) fn store_validation(&self, state: ValidationState) {
        self.core.slot.write().validation_state = state;
    }

    pub(crate) fn add_nested_check<F>(&self, check: F)
    where
        F: Fn(Option<&T>) -> Vec<String> + Send + Sync + 'static,
    {
        self.core.nested_checks.write().push(Arc::new(check));
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    /// Install the update handler, replacing any previous one.
    ///
    /// It runs on every write, same value included, with the new value.
    pub fn set_update_handler<F>(&self, handler: F)
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        *self.core.on_updated.write() = Some(Arc::new(handler));
    }

    pub(crate) fn add_write_hook<F>(&self, hook: F)
    where
        F: Fn(Option<&T>, Option<&T>) + Send + Sync + 'static,
    {
        self.core.write_hooks.write().push(Arc::new(hook));
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Mark the field as loading. The value is left untouched.
    pub fn begin_loading(&self) {
        self.core.slot.write().load_state = LoadState::Loading;
    }

    /// Mark the field's load as failed. The value is left untouched.
    pub fn fail_loading(&self) {
        self.core.slot.write().load_state = LoadState::Error;
    }

    /// Drive the field through a load.
    ///
    /// The field is `Loading` while `source` runs. Success writes the
    /// loaded value (leaving the field `Set`); failure leaves the value
    /// alone, marks the field `Error` and hands the error back.
    pub async fn load<F, E>(&self, source: F) -> Result<(), E>
    where
        F: Future<Output = Result<Option<T>, E>>,
    {
        self.begin_loading();
        match source.await {
            Ok(value) => {
                self.set_value(value);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(field = %self.core.id, "load failed");
                self.fail_loading();
                Err(err)
            }
        }
    }

    fn seed(&self, value: T) {
        let mut slot = self.core.slot.write();
        slot.value = Some(value);
        slot.load_state = LoadState::Set;
    }
}

impl<T: FieldValue> Default for BaseField<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BaseField<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> std::fmt::Debug for BaseField<T>
where
    T: FieldValue + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.core.slot.read();
        let meta = self.core.meta.read();
        f.debug_struct("BaseField")
            .field("id", &self.core.id)
            .field("key", &meta.key)
            .field("value", &slot.value)
            .field("load_state", &slot.load_state)
            .field("validation_state", &slot.validation_state)
            .finish()
    }
}

impl<T: FieldValue> Observable<T> for BaseField<T> {
    fn observable_id(&self) -> ObserverId {
        self.core.id
    }

    fn value(&self) -> Option<T> {
        self.core.value()
    }

    fn observations(&self) -> &ObservationRegistry<T> {
        &self.core.observations
    }

    fn downgrade_source(&self) -> Weak<dyn ValueSource<T>> {
        let weak: Weak<FieldCore<T>> = Arc::downgrade(&self.core);
        weak
    }
}

impl<T: FieldValue> AsObserver<T> for BaseField<T> {
    fn observer_handle(&self) -> ObserverHandle<T> {
        let weak: Weak<FieldCore<T>> = Arc::downgrade(&self.core);
        ObserverHandle::new(self.core.id, weak)
    }
}

/// Fluent declaration methods shared by every field flavour.
///
/// ```rust,ignore
/// let email = Field::<String>::new()
///     .with_key("email")
///     .with_priority(10)
///     .require_not_nil()
///     .require(|s| s.contains('@'), "must be an email address");
/// ```
pub trait FieldBuilder<T: FieldValue>: Sized {
    /// The underlying value holder.
    fn as_base(&self) -> &BaseField<T>;

    /// Start with `value`, marked `Set`, without notifying anyone.
    fn with_value(self, value: T) -> Self {
        self.as_base().seed(value);
        self
    }

    fn with_name(self, name: impl Into<String>) -> Self {
        self.as_base().set_name(Some(name.into()));
        self
    }

    fn with_key(self, key: impl Into<String>) -> Self {
        self.as_base().set_key(Some(key.into()));
        self
    }

    fn with_priority(self, priority: i32) -> Self {
        self.as_base().set_priority(priority);
        self
    }

    /// Add a rule from a predicate. `None` passes.
    fn require<F>(self, test: F, message: impl Into<String>) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.require_rule(ValidationRule::new(test).with_message(message))
    }

    fn require_rule(self, rule: impl Into<ValidationRule<T>>) -> Self {
        self.as_base().add_rule(rule);
        self
    }

    /// Require a value to be present ("is required").
    fn require_not_nil(self) -> Self {
        self.require_rule(ValidationRule::not_nil())
    }

    fn on_value_updated<F>(self, handler: F) -> Self
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        self.as_base().set_update_handler(handler);
        self
    }
}

impl<T: FieldValue> FieldBuilder<T> for BaseField<T> {
    fn as_base(&self) -> &BaseField<T> {
        self
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (count.clone(), count)
    }

    #[test]
    fn new_field_is_not_set() {
        let field = BaseField::<i32>::new();
        assert_eq!(field.value(), None);
        assert_eq!(field.load_state(), LoadState::NotSet);
        assert!(field.updated_at().is_none());
    }

    #[test]
    fn write_marks_set_and_resets_validation() {
        let field = BaseField::new().require(|v: &i32| *v > 0, "must be positive");
        assert!(field.validate().is_valid());

        field.set(-1);
        assert_eq!(field.load_state(), LoadState::Set);
        assert!(field.validation_state().is_unknown());
        assert_eq!(
            field.validate(),
            ValidationState::Invalid(vec!["must be positive".into()])
        );

        field.clear();
        assert_eq!(field.load_state(), LoadState::Set);
    }

    #[test]
    fn same_value_write_updates_without_notifying() {
        let field = BaseField::new().with_value(5);
        let (calls, calls_clone) = counter();
        field.add_observer_fn(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(field.set(6));
        let changed_at = field.changed_at();
        assert!(changed_at.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(!field.set(6));
        assert_eq!(field.changed_at(), changed_at);
        assert!(field.updated_at() >= changed_at);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn update_handler_sees_every_write() {
        let (calls, calls_clone) = counter();
        let field = BaseField::new().on_value_updated(move |_: Option<&i32>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        field.set(1);
        field.set(1);
        field.clear();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn validation_is_memoized_until_write() {
        let (runs, runs_clone) = counter();
        let field = BaseField::new().with_value(1).require(
            move |_: &i32| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                true
            },
            "never fails",
        );

        field.validate();
        field.validate();
        field.validate_if_needed();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        field.set(2);
        field.validate();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        field.revalidate();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn validation_collects_every_failure_in_order() {
        let field = BaseField::new()
            .with_value(String::new())
            .require(|s: &String| !s.is_empty(), "must not be empty")
            .require(|s: &String| s.starts_with('A'), "must start with A");

        assert_eq!(
            field.validate().messages(),
            ["must not be empty", "must start with A"]
        );
    }

    #[test]
    fn require_not_nil() {
        let field = BaseField::<String>::new().require_not_nil();
        assert_eq!(
            field.validate(),
            ValidationState::Invalid(vec!["is required".into()])
        );
        field.set("x".into());
        assert!(field.is_valid());
    }

    #[test]
    fn external_errors_accumulate() {
        let field = BaseField::<i32>::new();
        assert!(field.validate().is_valid());

        field.add_validation_error("taken");
        field.add_validation_error("reserved");
        assert_eq!(field.validation_state().messages(), ["taken", "reserved"]);

        // Cached: validate does not clear external errors.
        assert!(field.validate().is_invalid());
        field.reset_validation_state();
        assert!(field.validate().is_valid());
    }

    #[test]
    fn metadata_accessors() {
        let field = BaseField::<i32>::new()
            .with_name("Age")
            .with_key("age")
            .with_priority(3);
        assert_eq!(field.name().as_deref(), Some("Age"));
        assert_eq!(field.key().as_deref(), Some("age"));
        assert_eq!(field.priority(), 3);
    }

    #[test]
    fn clone_shares_state() {
        let a = BaseField::<i32>::new();
        let b = a.clone();
        a.set(4);
        assert_eq!(b.value(), Some(4));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn field_follows_source_until_assigned() {
        let source = BaseField::new().with_value(1);
        let follower = BaseField::<i32>::new();

        source.add_observer(&follower);
        assert_eq!(follower.value(), Some(1));
        assert_eq!(follower.source_count(), 1);

        source.set(2);
        assert_eq!(follower.value(), Some(2));

        follower.assign(Some(10));
        assert_eq!(follower.source_count(), 0);
        source.set(3);
        assert_eq!(follower.value(), Some(10));
    }

    #[test]
    fn remove_observer_detaches_upstream_link() {
        let source = BaseField::new().with_value(1);
        let follower = BaseField::<i32>::new();
        source.add_observer(&follower);

        source.remove_observer(&follower);
        assert_eq!(follower.source_count(), 0);
    }

    #[test]
    fn detaching_observation_drops_upstream_link() {
        let source = BaseField::new().with_value(1);
        let follower = BaseField::<i32>::new();
        let observation = source.add_observer(&follower);
        assert_eq!(follower.source_count(), 1);

        assert!(observation.detach());
        assert_eq!(follower.source_count(), 0);
        source.set(2);
        assert_eq!(follower.value(), Some(1));
    }

    #[test]
    fn normalizing_closure_leaves_followers_current() {
        let name = BaseField::<String>::new();
        let writer = name.clone();
        name.add_observer_fn(move |value| {
            if let Some(value) = value {
                let trimmed = value.trim();
                if trimmed != value {
                    writer.set(trimmed.to_string());
                }
            }
        });
        let follower = BaseField::<String>::new();
        name.add_observer(&follower);

        name.set("  x  ".to_string());
        assert_eq!(name.value().as_deref(), Some("x"));
        assert_eq!(follower.value(), name.value());
    }

    #[test]
    fn update_modifies_in_place() {
        let field = BaseField::new().with_value(vec![1, 2]);
        field.update(|value| {
            if let Some(items) = value {
                items.push(3);
            }
        });
        assert_eq!(field.value(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn load_states() {
        let field = BaseField::<i32>::new();
        field.begin_loading();
        assert_eq!(field.load_state(), LoadState::Loading);
        field.fail_loading();
        assert_eq!(field.load_state(), LoadState::Error);
        field.set(1);
        assert_eq!(field.load_state(), LoadState::Set);
    }
}
