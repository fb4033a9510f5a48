//! Type-erased access to fields.
//!
//! Models hold fields of many value types. [`FieldType`] is the object-safe
//! view they share: identity, metadata, state, untyped get and set, and
//! payload reading and writing.

use std::any::{type_name, Any};

use indexmap::IndexSet;

use super::{BaseField, FieldValue, LoadState, ValidationState};
use crate::reactive::ObserverId;
use crate::transform::Payload;

/// Identities of the fields already written during one export pass.
#[derive(Debug, Clone, Default)]
pub struct SeenFields {
    ids: IndexSet<ObserverId>,
}

impl SeenFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`; returns false if it was already recorded.
    pub fn insert(&mut self, id: ObserverId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Metadata and state of a value holder, independent of its value type.
pub trait ErasedField: Send + Sync {
    fn field_id(&self) -> ObserverId;
    fn name(&self) -> Option<String>;
    fn key(&self) -> Option<String>;
    fn priority(&self) -> i32;
    fn value_type_name(&self) -> &'static str;
    fn load_state(&self) -> LoadState;
    fn validation_state(&self) -> ValidationState;
    fn validate(&self) -> ValidationState;
    fn add_validation_error(&self, message: &str);
    fn reset_validation_state(&self);
    fn any_value(&self) -> Option<Box<dyn Any + Send>>;
    fn set_any_value(&self, value: Option<Box<dyn Any + Send>>) -> bool;
}

impl<T: FieldValue> ErasedField for BaseField<T> {
    fn field_id(&self) -> ObserverId {
        self.id()
    }

    fn name(&self) -> Option<String> {
        BaseField::name(self)
    }

    fn key(&self) -> Option<String> {
        BaseField::key(self)
    }

    fn priority(&self) -> i32 {
        BaseField::priority(self)
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn load_state(&self) -> LoadState {
        BaseField::load_state(self)
    }

    fn validation_state(&self) -> ValidationState {
        BaseField::validation_state(self)
    }

    fn validate(&self) -> ValidationState {
        BaseField::validate(self)
    }

    fn add_validation_error(&self, message: &str) {
        BaseField::add_validation_error(self, message);
    }

    fn reset_validation_state(&self) {
        BaseField::reset_validation_state(self);
    }

    fn any_value(&self) -> Option<Box<dyn Any + Send>> {
        BaseField::value(self).map(|value| Box::new(value) as Box<dyn Any + Send>)
    }

    fn set_any_value(&self, value: Option<Box<dyn Any + Send>>) -> bool {
        match value {
            None => {
                self.clear();
                true
            }
            Some(value) => match value.downcast::<T>() {
                Ok(value) => {
                    self.set(*value);
                    true
                }
                Err(_) => {
                    tracing::debug!(
                        field = %self.id(),
                        expected = type_name::<T>(),
                        "ignored untyped value of the wrong type"
                    );
                    false
                }
            },
        }
    }
}

/// The object-safe view of a field.
///
/// Implementors supply their value holder and the payload conversion; the
/// rest is provided.
pub trait FieldType: Send + Sync {
    /// The underlying value holder.
    fn erased(&self) -> &dyn ErasedField;

    /// Import this field's entry from `payload`. An absent key leaves the
    /// field unchanged.
    fn read_from(&self, payload: &Payload);

    /// Write this field's value under `key`, visiting nested fields with
    /// `seen`.
    fn write_unseen(&self, payload: &mut Payload, seen: &mut SeenFields, key: &str, explicit_null: bool);

    /// Write the placeholder used when this field was already visited in the
    /// current pass. Rewrites the value by default, honouring
    /// `explicit_null` the same way the first visit did.
    fn write_seen(&self, payload: &mut Payload, seen: &mut SeenFields, key: &str, explicit_null: bool) {
        self.write_unseen(payload, seen, key, explicit_null);
    }

    /// Write this field into `payload`, consulting and updating `seen`.
    ///
    /// Fields without a key are skipped.
    fn write_to(&self, payload: &mut Payload, seen: &mut SeenFields, explicit_null: bool) {
        let Some(key) = self.key() else {
            return;
        };
        if seen.insert(self.field_id()) {
            self.write_unseen(payload, seen, &key, explicit_null);
        } else {
            tracing::debug!(field = %self.field_id(), %key, "field already written, using placeholder");
            self.write_seen(payload, seen, &key, explicit_null);
        }
    }

    /// Write this field into `payload` as the start of a fresh pass.
    fn export_into(&self, payload: &mut Payload, explicit_null: bool) {
        let mut seen = SeenFields::new();
        self.write_to(payload, &mut seen, explicit_null);
    }

    fn field_id(&self) -> ObserverId {
        self.erased().field_id()
    }

    fn name(&self) -> Option<String> {
        self.erased().name()
    }

    fn key(&self) -> Option<String> {
        self.erased().key()
    }

    fn priority(&self) -> i32 {
        self.erased().priority()
    }

    fn value_type_name(&self) -> &'static str {
        self.erased().value_type_name()
    }

    fn load_state(&self) -> LoadState {
        self.erased().load_state()
    }

    fn validation_state(&self) -> ValidationState {
        self.erased().validation_state()
    }

    fn validate(&self) -> ValidationState {
        self.erased().validate()
    }

    fn add_validation_error(&self, message: &str) {
        self.erased().add_validation_error(message);
    }

    fn reset_validation_state(&self) {
        self.erased().reset_validation_state();
    }

    /// The value, boxed. `None` when the field holds no value.
    fn any_value(&self) -> Option<Box<dyn Any + Send>> {
        self.erased().any_value()
    }

    /// Assign from an untyped value.
    ///
    /// `None` always clears the field. A value of the wrong type is ignored
    /// and `false` returned.
    fn set_any_value(&self, value: Option<Box<dyn Any + Send>>) -> bool {
        self.erased().set_any_value(value)
    }
}
