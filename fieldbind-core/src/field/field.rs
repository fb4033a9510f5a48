//! Field Implementation
//!
//! A [`Field`] is a [`BaseField`] that can travel through payloads. It keeps
//! a table of named [`ValueTransformer`]s; the one registered as
//! `"default"` (or the field flavour's built-in transformer when none is)
//! is used for import and export.
//!
//! The built-in transformer depends on how the field was created:
//!
//! | Constructor                  | Built-in transformer                 |
//! |------------------------------|--------------------------------------|
//! | [`Field::new`]               | serde cast                           |
//! | [`Field::automatic`]         | the type's [`ValueTransformable`] impl |
//! | [`Field::enumeration`]       | raw value ([`RawRepresentable`])     |
//! | [`Field::with_transformer`]  | the one given                        |

use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{ArrayField, BaseField, ErasedField, FieldBuilder, FieldType, FieldValue, SeenFields};
use crate::reactive::{AsObserver, Observable, ObservationRegistry, ObserverHandle, ObserverId, ValueSource};
use crate::transform::{
    Payload, RawRepresentable, ValueTransformable, ValueTransformer, DEFAULT_TRANSFORMER,
};

type RepeatHandler<T> = Arc<dyn Fn(Option<&T>) -> Option<Value> + Send + Sync>;

struct Codec<T> {
    transformers: RwLock<IndexMap<String, ValueTransformer<T>>>,
    fallback: ValueTransformer<T>,
    on_repeat: RwLock<Option<RepeatHandler<T>>>,
}

/// A field with payload conversion.
pub struct Field<T> {
    base: BaseField<T>,
    codec: Arc<Codec<T>>,
}

/// A field over a fieldless enum, converted through its raw value.
pub type EnumField<T> = Field<T>;

impl<T> Field<T>
where
    T: FieldValue + Serialize + DeserializeOwned,
{
    /// An empty field converted by serde cast.
    pub fn new() -> Self {
        Self::with_transformer(ValueTransformer::cast())
    }
}

impl<T> Field<T>
where
    T: FieldValue + ValueTransformable,
{
    /// An empty field converted by the value type's own transformer.
    pub fn automatic() -> Self {
        Self::with_transformer(T::value_transformer())
    }
}

impl<T> Field<T>
where
    T: FieldValue + RawRepresentable,
{
    /// An empty field converted through the enum's raw value.
    pub fn enumeration() -> Self {
        Self::with_transformer(ValueTransformer::raw())
    }
}

impl<T: FieldValue> Field<T> {
    /// An empty field using `fallback` when no default transformer is
    /// registered.
    pub fn with_transformer(fallback: ValueTransformer<T>) -> Self {
        Self {
            base: BaseField::new(),
            codec: Arc::new(Codec {
                transformers: RwLock::new(IndexMap::new()),
                fallback,
                on_repeat: RwLock::new(None),
            }),
        }
    }

    /// The underlying value holder.
    pub fn base(&self) -> &BaseField<T> {
        &self.base
    }

    // ------------------------------------------------------------------
    // Transformers
    // ------------------------------------------------------------------

    /// Register `transformer` as the default.
    pub fn transform(self, transformer: impl Into<ValueTransformer<T>>) -> Self {
        self.transform_named(DEFAULT_TRANSFORMER, transformer)
    }

    /// Register `transformer` under `name`.
    pub fn transform_named(self, name: &str, transformer: impl Into<ValueTransformer<T>>) -> Self {
        self.set_transformer(name, transformer);
        self
    }

    /// Register a default transformer built from a closure pair.
    pub fn transform_with<I, E>(self, import: I, export: E) -> Self
    where
        I: Fn(&Value) -> Option<T> + Send + Sync + 'static,
        E: Fn(&T) -> Option<Value> + Send + Sync + 'static,
    {
        self.transform(ValueTransformer::new(import, export))
    }

    pub fn set_transformer(&self, name: &str, transformer: impl Into<ValueTransformer<T>>) {
        self.codec
            .transformers
            .write()
            .insert(name.to_string(), transformer.into());
    }

    /// Look up a transformer.
    ///
    /// Without a name this is the registered default, or the built-in one.
    /// A name that was never registered yields `None`.
    pub fn value_transformer(&self, name: Option<&str>) -> Option<ValueTransformer<T>> {
        let Some(name) = name else {
            return Some(self.default_transformer());
        };
        let found = self.codec.transformers.read().get(name).cloned();
        if found.is_none() {
            tracing::debug!(field = %self.base.id(), transformer = name, "no transformer registered");
        }
        found
    }

    fn default_transformer(&self) -> ValueTransformer<T> {
        self.codec
            .transformers
            .read()
            .get(DEFAULT_TRANSFORMER)
            .cloned()
            .unwrap_or_else(|| self.codec.fallback.clone())
    }

    /// Convert a wire value with the default transformer.
    pub fn import_value(&self, external: Option<&Value>) -> Option<T> {
        self.default_transformer().import_value(external)
    }

    /// Convert the current value with the default transformer.
    pub fn export_value(&self, explicit_null: bool) -> Option<Value> {
        self.base
            .read(|value| self.default_transformer().export_value(value, explicit_null))
    }

    /// Import this field's entry from `payload` with a named transformer.
    ///
    /// A missing key, a missing transformer or a keyless field leaves the
    /// field unchanged.
    pub fn read_with(&self, payload: &Payload, transformer: &str) {
        if let Some(transformer) = self.value_transformer(Some(transformer)) {
            self.read_through(payload, &transformer);
        }
    }

    /// Export this field into `payload` with a named transformer.
    pub fn write_with(&self, payload: &mut Payload, transformer: &str, explicit_null: bool) {
        let (Some(key), Some(transformer)) = (self.base.key(), self.value_transformer(Some(transformer))) else {
            return;
        };
        let exported = self
            .base
            .read(|value| transformer.export_value(value, explicit_null));
        put(payload, &key, exported);
    }

    fn read_through(&self, payload: &Payload, transformer: &ValueTransformer<T>) {
        let Some(key) = self.base.key() else {
            return;
        };
        if let Some(external) = payload.get(&key) {
            self.base.set_value(transformer.import_value(Some(external)));
        }
    }

    /// Set what this field writes when it is reached again in the same
    /// export pass. By default it writes its value again.
    pub fn on_repeat_visit<F>(self, placeholder: F) -> Self
    where
        F: Fn(Option<&T>) -> Option<Value> + Send + Sync + 'static,
    {
        *self.codec.on_repeat.write() = Some(Arc::new(placeholder));
        self
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    /// Whether both fields hold equal values.
    pub fn value_eq(&self, other: &Field<T>) -> bool {
        self.base.value() == other.base.value()
    }

    /// Whether this field holds `value`.
    pub fn is(&self, value: &T) -> bool {
        self.base.read(|current| current == Some(value))
    }
}

impl<T> Field<T>
where
    T: FieldValue + Eq + Hash,
{
    /// An array field whose elements are converted and validated by this
    /// field.
    pub fn into_array(self) -> ArrayField<T> {
        ArrayField::new(self)
    }
}

/// Insert `value` under `key`, or remove the key when there is nothing to
/// write.
pub(crate) fn put(payload: &mut Payload, key: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            payload.insert(key.to_string(), value);
        }
        None => {
            payload.remove(key);
        }
    }
}

impl<T> Default for Field<T>
where
    T: FieldValue + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<T> std::fmt::Debug for Field<T>
where
    T: FieldValue + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("base", &self.base)
            .field(
                "transformers",
                &self.codec.transformers.read().keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T> Deref for Field<T> {
    type Target = BaseField<T>;

    fn deref(&self) -> &BaseField<T> {
        &self.base
    }
}

impl<T: FieldValue> FieldBuilder<T> for Field<T> {
    fn as_base(&self) -> &BaseField<T> {
        &self.base
    }
}

impl<T: FieldValue> Observable<T> for Field<T> {
    fn observable_id(&self) -> ObserverId {
        self.base.observable_id()
    }

    fn value(&self) -> Option<T> {
        self.base.value()
    }

    fn observations(&self) -> &ObservationRegistry<T> {
        self.base.observations()
    }

    fn downgrade_source(&self) -> Weak<dyn ValueSource<T>> {
        self.base.downgrade_source()
    }
}

impl<T: FieldValue> AsObserver<T> for Field<T> {
    fn observer_handle(&self) -> ObserverHandle<T> {
        self.base.observer_handle()
    }
}

impl<T: FieldValue> FieldType for Field<T> {
    fn erased(&self) -> &dyn ErasedField {
        &self.base
    }

    fn read_from(&self, payload: &Payload) {
        self.read_through(payload, &self.default_transformer());
    }

    fn write_unseen(&self, payload: &mut Payload, _seen: &mut SeenFields, key: &str, explicit_null: bool) {
        put(payload, key, self.export_value(explicit_null));
    }

    fn write_seen(&self, payload: &mut Payload, seen: &mut SeenFields, key: &str, explicit_null: bool) {
        let placeholder = self.codec.on_repeat.read().clone();
        match placeholder {
            Some(placeholder) => {
                let value = self.base.read(|value| placeholder(value));
                put(payload, key, value);
            }
            None => self.write_unseen(payload, seen, key, explicit_null),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
