//! ArrayField Implementation
//!
//! An [`ArrayField`] holds a vector of values and delegates per-element
//! conversion and validation to an element [`Field`].
//!
//! # Element Hooks
//!
//! Every write compares the old and new vectors as sets and fires
//! `on_value_removed` hooks for elements that disappeared, then
//! `on_value_added` hooks for elements that appeared. Replacing
//! `[1, 2, 3]` with `[2, 3, 4]` fires `removed(1)` and `added(4)` once each,
//! alongside the single whole-value notification observers receive.
//! Duplicates within a vector count once.

use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use serde_json::Value;

use super::field::put;
use super::{BaseField, ErasedField, Field, FieldBuilder, FieldType, FieldValue, SeenFields};
use crate::reactive::{AsObserver, Observable, ObservationRegistry, ObserverHandle, ObserverId, ValueSource};
use crate::transform::{Payload, ValueTransformer};

type ElementHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ElementHooks<T> {
    added: RwLock<Vec<ElementHook<T>>>,
    removed: RwLock<Vec<ElementHook<T>>>,
}

impl<T> ElementHooks<T>
where
    T: FieldValue + Eq + Hash,
{
    fn dispatch(&self, old: &[T], new: &[T]) {
        let before: IndexSet<&T> = old.iter().collect();
        let after: IndexSet<&T> = new.iter().collect();
        let removed: Vec<&T> = before.difference(&after).copied().collect();
        let added: Vec<&T> = after.difference(&before).copied().collect();

        if !removed.is_empty() {
            let hooks = self.removed.read().clone();
            for value in removed {
                hooks.iter().for_each(|hook| hook(value));
            }
        }
        if !added.is_empty() {
            let hooks = self.added.read().clone();
            for value in added {
                hooks.iter().for_each(|hook| hook(value));
            }
        }
    }
}

/// A multi-valued field.
///
/// Name, key and priority default to the element field's.
///
/// ```rust,ignore
/// let tags = Field::<String>::new()
///     .with_key("tags")
///     .require_rule(NotBlankRule)
///     .into_array();
/// ```
pub struct ArrayField<T> {
    base: BaseField<Vec<T>>,
    element: Field<T>,
    hooks: Arc<ElementHooks<T>>,
}

impl<T> ArrayField<T>
where
    T: FieldValue + Eq + Hash,
{
    /// An array field holding an empty vector, marked `Set`.
    pub fn new(element: Field<T>) -> Self {
        let base = BaseField::<Vec<T>>::new().with_value(Vec::new());
        base.set_name(element.name());
        base.set_key(element.key());
        base.set_priority(element.priority());

        let hooks = Arc::new(ElementHooks {
            added: RwLock::new(Vec::new()),
            removed: RwLock::new(Vec::new()),
        });

        let diff = Arc::clone(&hooks);
        base.add_write_hook(move |old: Option<&Vec<T>>, new: Option<&Vec<T>>| {
            diff.dispatch(
                old.map(Vec::as_slice).unwrap_or_default(),
                new.map(Vec::as_slice).unwrap_or_default(),
            );
        });

        let checker = element.clone();
        base.add_nested_check(move |values: Option<&Vec<T>>| {
            let mut messages = IndexSet::new();
            for value in values.into_iter().flatten() {
                messages.extend(checker.check(Some(value)));
            }
            messages.into_iter().collect()
        });

        Self {
            base,
            element,
            hooks,
        }
    }

    /// The field describing individual elements.
    pub fn element(&self) -> &Field<T> {
        &self.element
    }

    /// Run `hook` for every element that appears in a write.
    pub fn on_value_added<F>(self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.hooks.added.write().push(Arc::new(hook));
        self
    }

    /// Run `hook` for every element that disappears in a write.
    pub fn on_value_removed<F>(self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.hooks.removed.write().push(Arc::new(hook));
        self
    }

    /// Append `value`.
    pub fn push(&self, value: T) {
        self.base.update(|values| values.get_or_insert_with(Vec::new).push(value));
    }

    /// Remove the first element equal to `value`. Returns whether one was
    /// found.
    pub fn remove_first(&self, value: &T) -> bool {
        let index = self
            .base
            .read(|values| values.and_then(|values| values.iter().position(|v| v == value)));
        match index {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    /// Remove the element at `index`. Out-of-range indices are ignored.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        let mut values = self.base.value()?;
        if index >= values.len() {
            return None;
        }
        let removed = values.remove(index);
        self.base.set(values);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.base.read(|values| values.map_or(0, Vec::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, value: &T) -> bool {
        self.base
            .read(|values| values.is_some_and(|values| values.contains(value)))
    }

    /// Import the array under this field's key with a named element
    /// transformer.
    pub fn read_with(&self, payload: &Payload, transformer: &str) {
        if let Some(transformer) = self.element.value_transformer(Some(transformer)) {
            self.read_through(payload, &transformer);
        }
    }

    /// Export the array with a named element transformer.
    pub fn write_with(&self, payload: &mut Payload, transformer: &str, explicit_null: bool) {
        let (Some(key), Some(transformer)) =
            (self.base.key(), self.element.value_transformer(Some(transformer)))
        else {
            return;
        };
        put(payload, &key, self.export_through(&transformer, explicit_null));
    }

    fn read_through(&self, payload: &Payload, transformer: &ValueTransformer<T>) {
        let Some(key) = self.base.key() else {
            return;
        };
        match payload.get(&key) {
            Some(Value::Array(items)) => {
                let values = items
                    .iter()
                    .filter_map(|item| transformer.import_value(Some(item)))
                    .collect();
                self.base.set(values);
            }
            Some(other) => {
                tracing::debug!(field = %self.base.id(), %key, found = ?other, "expected an array, leaving value unchanged");
            }
            None => {}
        }
    }

    fn export_through(&self, transformer: &ValueTransformer<T>, explicit_null: bool) -> Option<Value> {
        self.base.read(|values| match values {
            Some(values) => Some(Value::Array(
                values
                    .iter()
                    .filter_map(|value| transformer.export_value(Some(value), false))
                    .collect(),
            )),
            None => ValueTransformer::<T>::null_value(explicit_null),
        })
    }

    fn element_transformer(&self) -> ValueTransformer<T> {
        self.element
            .value_transformer(None)
            .unwrap_or_else(ValueTransformer::empty)
    }
}

impl<T> From<Field<T>> for ArrayField<T>
where
    T: FieldValue + Eq + Hash,
{
    fn from(element: Field<T>) -> Self {
        Self::new(element)
    }
}

impl<T> Clone for ArrayField<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            element: self.element.clone(),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<T> std::fmt::Debug for ArrayField<T>
where
    T: FieldValue + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayField").field("base", &self.base).finish()
    }
}

impl<T> Deref for ArrayField<T> {
    type Target = BaseField<Vec<T>>;

    fn deref(&self) -> &BaseField<Vec<T>> {
        &self.base
    }
}

impl<T> FieldBuilder<Vec<T>> for ArrayField<T>
where
    T: FieldValue + Eq + Hash,
{
    fn as_base(&self) -> &BaseField<Vec<T>> {
        &self.base
    }
}

impl<T> Observable<Vec<T>> for ArrayField<T>
where
    T: FieldValue + Eq + Hash,
{
    fn observable_id(&self) -> ObserverId {
        self.base.observable_id()
    }

    fn value(&self) -> Option<Vec<T>> {
        self.base.value()
    }

    fn observations(&self) -> &ObservationRegistry<Vec<T>> {
        self.base.observations()
    }

    fn downgrade_source(&self) -> Weak<dyn ValueSource<Vec<T>>> {
        self.base.downgrade_source()
    }
}

impl<T> AsObserver<Vec<T>> for ArrayField<T>
where
    T: FieldValue + Eq + Hash,
{
    fn observer_handle(&self) -> ObserverHandle<Vec<T>> {
        self.base.observer_handle()
    }
}

impl<T> FieldType for ArrayField<T>
where
    T: FieldValue + Eq + Hash,
{
    fn erased(&self) -> &dyn ErasedField {
        &self.base
    }

    fn read_from(&self, payload: &Payload) {
        self.read_through(payload, &self.element_transformer());
    }

    fn write_unseen(&self, payload: &mut Payload, _seen: &mut SeenFields, key: &str, explicit_null: bool) {
        let exported = self.export_through(&self.element_transformer(), explicit_null);
        put(payload, key, exported);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
