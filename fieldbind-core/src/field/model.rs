//! Models: groups of fields read and written as one payload.
//!
//! A [`FieldModel`] lists its fields; everything else (payload import and
//! export, validation, ordering) is provided. A [`ModelField`] nests one
//! model inside another under a key.
//!
//! Export threads a [`SeenFields`] set through the whole pass, so models
//! that refer to each other stop at the first field reached twice instead
//! of recursing forever.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::put;
use super::{BaseField, ErasedField, FieldBuilder, FieldType, SeenFields};
use crate::error::{FieldError, Result};
use crate::reactive::{AsObserver, Observable, ObservationRegistry, ObserverHandle, ObserverId, ValueSource};
use crate::transform::{Payload, ValueTransformer};

/// Options for exporting a whole model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Write `null` for fields without a value instead of omitting them.
    pub explicit_null: bool,
}

/// A model object made of fields.
///
/// ```rust,ignore
/// struct Person {
///     name: Field<String>,
///     age: Field<u32>,
/// }
///
/// impl FieldModel for Person {
///     fn fields(&self) -> Vec<&dyn FieldType> {
///         vec![&self.name, &self.age]
///     }
/// }
/// ```
pub trait FieldModel: Send + Sync {
    /// Every field of the model, in declaration order.
    fn fields(&self) -> Vec<&dyn FieldType>;

    /// The field stored under `key`.
    fn field(&self, key: &str) -> Option<&dyn FieldType> {
        self.fields()
            .into_iter()
            .find(|field| field.key().as_deref() == Some(key))
    }

    /// Fields sorted by ascending priority. Ties keep declaration order.
    fn fields_by_priority(&self) -> Vec<&dyn FieldType> {
        let mut fields = self.fields();
        fields.sort_by_key(|field| field.priority());
        fields
    }

    /// Import every keyed field from `payload`.
    fn read_payload(&self, payload: &Payload) {
        for field in self.fields() {
            field.read_from(payload);
        }
    }

    /// Export every keyed field into `payload` as part of an ongoing pass.
    fn write_payload(&self, payload: &mut Payload, seen: &mut SeenFields, explicit_null: bool) {
        for field in self.fields() {
            field.write_to(payload, seen, explicit_null);
        }
    }

    /// Export the model as a fresh payload.
    fn to_payload(&self, options: ExportOptions) -> Payload {
        let mut payload = Payload::new();
        let mut seen = SeenFields::new();
        self.write_payload(&mut payload, &mut seen, options.explicit_null);
        payload
    }

    /// Import from a JSON object string.
    fn read_json(&self, json: &str) -> Result<()> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(payload) => {
                self.read_payload(&payload);
                Ok(())
            }
            other => Err(FieldError::mismatch("object", &other)),
        }
    }

    /// Export as a JSON object string.
    fn to_json(&self, options: ExportOptions) -> Result<String> {
        Ok(serde_json::to_string(&self.to_payload(options))?)
    }

    /// Validate every field. Returns whether all are valid.
    fn validate_all(&self) -> bool {
        self.fields()
            .iter()
            .map(|field| field.validate().is_valid())
            .fold(true, |all, valid| all && valid)
    }

    /// Failure messages of every invalid field, keyed by the field's key
    /// (or name, or id when it has neither).
    fn validation_errors(&self) -> IndexMap<String, Vec<String>> {
        self.fields()
            .into_iter()
            .filter_map(|field| {
                let messages = field.validate().messages().to_vec();
                if messages.is_empty() {
                    return None;
                }
                let label = field
                    .key()
                    .or_else(|| field.name())
                    .unwrap_or_else(|| field.field_id().to_string());
                Some((label, messages))
            })
            .collect()
    }
}

/// A shared model reference compared by identity.
pub struct ModelRef<M>(Arc<M>);

impl<M> ModelRef<M> {
    pub fn new(model: M) -> Self {
        Self(Arc::new(model))
    }

    pub fn from_arc(model: Arc<M>) -> Self {
        Self(model)
    }

    pub fn as_arc(&self) -> &Arc<M> {
        &self.0
    }
}

impl<M> Clone for ModelRef<M> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<M> PartialEq for ModelRef<M> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<M> Eq for ModelRef<M> {}

impl<M> Deref for ModelRef<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.0
    }
}

impl<M> std::fmt::Debug for ModelRef<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModelRef")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

type Factory<M> = Arc<dyn Fn() -> M + Send + Sync>;

/// A field holding a nested model, exported as a nested object.
///
/// Importing an object reads it into the current model, creating one with
/// the factory when the field is empty. Importing `null` clears the field.
/// When the field is reached again in the same export pass it writes a
/// placeholder, an empty object unless configured.
pub struct ModelField<M> {
    base: BaseField<ModelRef<M>>,
    factory: Option<Factory<M>>,
    placeholder: Arc<RwLock<Value>>,
}

impl<M> ModelField<M>
where
    M: FieldModel + 'static,
{
    pub fn new() -> Self {
        Self {
            base: BaseField::new(),
            factory: None,
            placeholder: Arc::new(RwLock::new(Value::Object(Payload::new()))),
        }
    }

    /// Build models for payloads that arrive while the field is empty.
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// The value written when the field is reached again in one pass.
    pub fn with_placeholder(self, placeholder: Value) -> Self {
        *self.placeholder.write() = placeholder;
        self
    }

    /// Store `model`, returning the shared reference.
    pub fn set_model(&self, model: M) -> ModelRef<M> {
        let model = ModelRef::new(model);
        self.base.set(model.clone());
        model
    }

    pub fn model(&self) -> Option<ModelRef<M>> {
        self.base.value()
    }
}

impl<M> Default for ModelField<M>
where
    M: FieldModel + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for ModelField<M> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            factory: self.factory.clone(),
            placeholder: Arc::clone(&self.placeholder),
        }
    }
}

impl<M> Deref for ModelField<M> {
    type Target = BaseField<ModelRef<M>>;

    fn deref(&self) -> &BaseField<ModelRef<M>> {
        &self.base
    }
}

impl<M> FieldBuilder<ModelRef<M>> for ModelField<M>
where
    M: FieldModel + 'static,
{
    fn as_base(&self) -> &BaseField<ModelRef<M>> {
        &self.base
    }
}

impl<M> Observable<ModelRef<M>> for ModelField<M>
where
    M: FieldModel + 'static,
{
    fn observable_id(&self) -> ObserverId {
        self.base.observable_id()
    }

    fn value(&self) -> Option<ModelRef<M>> {
        self.base.value()
    }

    fn observations(&self) -> &ObservationRegistry<ModelRef<M>> {
        self.base.observations()
    }

    fn downgrade_source(&self) -> Weak<dyn ValueSource<ModelRef<M>>> {
        self.base.downgrade_source()
    }
}

impl<M> AsObserver<ModelRef<M>> for ModelField<M>
where
    M: FieldModel + 'static,
{
    fn observer_handle(&self) -> ObserverHandle<ModelRef<M>> {
        self.base.observer_handle()
    }
}

impl<M> FieldType for ModelField<M>
where
    M: FieldModel + 'static,
{
    fn erased(&self) -> &dyn ErasedField {
        &self.base
    }

    fn read_from(&self, payload: &Payload) {
        let Some(key) = self.base.key() else {
            return;
        };
        match payload.get(&key) {
            Some(Value::Object(nested)) => match (self.base.value(), &self.factory) {
                (Some(model), _) => model.read_payload(nested),
                (None, Some(factory)) => {
                    let model = factory();
                    model.read_payload(nested);
                    self.base.set(ModelRef::new(model));
                }
                (None, None) => {
                    tracing::debug!(field = %self.base.id(), %key, "no model to read into");
                }
            },
            Some(Value::Null) => {
                self.base.clear();
            }
            Some(other) => {
                tracing::debug!(field = %self.base.id(), %key, found = ?other, "expected an object, leaving value unchanged");
            }
            None => {}
        }
    }

    fn write_unseen(&self, payload: &mut Payload, seen: &mut SeenFields, key: &str, explicit_null: bool) {
        let exported = match self.base.value() {
            Some(model) => {
                let mut nested = Payload::new();
                model.write_payload(&mut nested, seen, explicit_null);
                Some(Value::Object(nested))
            }
            None => ValueTransformer::<ModelRef<M>>::null_value(explicit_null),
        };
        put(payload, key, exported);
    }

    fn write_seen(&self, payload: &mut Payload, _seen: &mut SeenFields, key: &str, _explicit_null: bool) {
        let placeholder = self.placeholder.read().clone();
        put(payload, key, Some(placeholder));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use serde_json::json;

    struct Person {
        name: Field<String>,
        age: Field<u32>,
        friend: ModelField<Person>,
    }

    impl Person {
        fn new() -> Self {
            Self {
                name: Field::<String>::new().with_key("name").with_priority(1).require_not_nil(),
                age: Field::<u32>::new().with_key("age").with_priority(0),
                friend: ModelField::<Person>::new().with_key("friend").with_priority(2),
            }
        }
    }

    impl FieldModel for Person {
        fn fields(&self) -> Vec<&dyn FieldType> {
            vec![&self.name, &self.age, &self.friend]
        }
    }

    #[test]
    fn reads_and_exports_payload() {
        let person = Person::new();
        person
            .read_json(r#"{ "name": "Ada", "age": 36 }"#)
            .unwrap();
        assert_eq!(person.name.value().as_deref(), Some("Ada"));
        assert_eq!(person.age.value(), Some(36));

        let payload = person.to_payload(ExportOptions::default());
        assert_eq!(Value::Object(payload), json!({ "name": "Ada", "age": 36 }));

        let payload = person.to_payload(ExportOptions { explicit_null: true });
        assert_eq!(payload.get("friend"), Some(&Value::Null));
    }

    #[test]
    fn read_json_rejects_non_objects() {
        let person = Person::new();
        assert!(matches!(person.read_json("[1]"), Err(FieldError::TypeMismatch { .. })));
        assert!(matches!(person.read_json("{"), Err(FieldError::Json(_))));
    }

    #[test]
    fn priority_ordering() {
        let person = Person::new();
        let keys: Vec<_> = person
            .fields_by_priority()
            .iter()
            .filter_map(|field| field.key())
            .collect();
        assert_eq!(keys, ["age", "name", "friend"]);
        assert!(person.field("age").is_some());
        assert!(person.field("missing").is_none());
    }

    #[test]
    fn validation_report() {
        let person = Person::new();
        assert!(!person.validate_all());
        let errors = person.validation_errors();
        assert_eq!(errors.get("name"), Some(&vec!["is required".to_string()]));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn nested_model_round_trip() {
        let person = Person::new();
        let friend = Person::new();
        friend.name.set("Grace".into());
        person.friend.set_model(friend);

        let payload = person.to_payload(ExportOptions::default());
        assert_eq!(payload.get("friend"), Some(&json!({ "name": "Grace" })));

        let copy = Person::new().friend.with_factory(Person::new);
        copy.read_from(&payload);
        let nested = copy.model().map(|model| model.name.value());
        assert_eq!(nested, Some(Some("Grace".to_string())));
    }

    #[test]
    fn cycles_stop_at_placeholder() {
        let a = ModelRef::new(Person::new());
        let b = ModelRef::new(Person::new());
        a.name.set("A".into());
        b.name.set("B".into());
        a.friend.set(b.clone());
        b.friend.set(a.clone());

        let payload = a.to_payload(ExportOptions::default());
        assert_eq!(
            Value::Object(payload),
            json!({
                "name": "A",
                "friend": {
                    "name": "B",
                    "friend": {
                        "name": "A",
                        "friend": {}
                    }
                }
            })
        );

        // Break the reference cycle.
        a.friend.clear();
    }

    #[test]
    fn model_identity() {
        let shared = ModelRef::new(Person::new());
        assert_eq!(shared, shared.clone());
        assert_ne!(shared, ModelRef::new(Person::new()));
    }
}
