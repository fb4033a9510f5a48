//! Value Transformers
//!
//! A [`ValueTransformer`] converts between a field's typed value and the
//! loosely typed wire value stored in a [`Payload`].
//!
//! Conversions never fail loudly. A wire value of the wrong shape imports
//! as `None`; a value that cannot be exported writes nothing. The reason is
//! logged at `debug` level.
//!
//! # Null handling
//!
//! A payload distinguishes a key that is absent from a key holding
//! `null`. Exporting `None` produces nothing by default, or
//! [`Value::Null`] when the caller asks for an explicit null.

mod date;
mod raw;

pub use date::DateTransformer;
pub use raw::RawRepresentable;

use std::any::type_name;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FieldError, Result};

/// A string-keyed map of wire values.
pub type Payload = serde_json::Map<String, Value>;

/// Name under which a field's default transformer is registered.
pub const DEFAULT_TRANSFORMER: &str = "default";

type ImportAction<T> = Arc<dyn Fn(&Value) -> Result<T> + Send + Sync>;
type ExportAction<T> = Arc<dyn Fn(&T) -> Result<Value> + Send + Sync>;

/// A typed converter between `T` and wire values.
///
/// Cloning is cheap: the actions are shared.
pub struct ValueTransformer<T> {
    import: Option<ImportAction<T>>,
    export: Option<ExportAction<T>>,
}

impl<T> Clone for ValueTransformer<T> {
    fn clone(&self) -> Self {
        Self {
            import: self.import.clone(),
            export: self.export.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ValueTransformer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueTransformer")
            .field("target", &type_name::<T>())
            .field("imports", &self.import.is_some())
            .field("exports", &self.export.is_some())
            .finish()
    }
}

impl<T: 'static> ValueTransformer<T> {
    /// A transformer that maps everything to nothing.
    pub fn empty() -> Self {
        Self {
            import: None,
            export: None,
        }
    }

    /// Build a transformer from a pair of infallible-looking closures.
    ///
    /// `None` from either closure means "no value".
    pub fn new<I, E>(import: I, export: E) -> Self
    where
        I: Fn(&Value) -> Option<T> + Send + Sync + 'static,
        E: Fn(&T) -> Option<Value> + Send + Sync + 'static,
    {
        Self::try_new(
            move |value| import(value).ok_or_else(|| FieldError::mismatch(type_name::<T>(), value)),
            move |value| {
                export(value).ok_or_else(|| FieldError::TypeMismatch {
                    expected: "exportable value",
                    found: type_name::<T>().to_string(),
                })
            },
        )
    }

    /// Build a transformer from fallible closures. Errors are logged and
    /// treated as "no value".
    pub fn try_new<I, E>(import: I, export: E) -> Self
    where
        I: Fn(&Value) -> Result<T> + Send + Sync + 'static,
        E: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            import: Some(Arc::new(import)),
            export: Some(Arc::new(export)),
        }
    }

    /// Convert a wire value into a field value.
    ///
    /// Absent input, `null`, and input the transformer rejects all yield
    /// `None`.
    pub fn import_value(&self, external: Option<&Value>) -> Option<T> {
        let external = external.filter(|value| !value.is_null())?;
        let import = self.import.as_ref()?;
        match import(external) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(target_type = type_name::<T>(), %err, "import rejected wire value");
                None
            }
        }
    }

    /// Convert a field value into a wire value.
    ///
    /// `None` (or a value the transformer cannot export) yields
    /// [`ValueTransformer::null_value`].
    pub fn export_value(&self, value: Option<&T>, explicit_null: bool) -> Option<Value> {
        let (Some(value), Some(export)) = (value, self.export.as_ref()) else {
            return Self::null_value(explicit_null);
        };
        match export(value) {
            Ok(external) => Some(external),
            Err(err) => {
                tracing::debug!(source_type = type_name::<T>(), %err, "export failed");
                Self::null_value(explicit_null)
            }
        }
    }

    /// The wire representation of "no value": nothing, or `null` when
    /// `explicit` is set.
    pub fn null_value(explicit: bool) -> Option<Value> {
        explicit.then_some(Value::Null)
    }
}

impl<T> ValueTransformer<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Best-effort cast through serde.
    ///
    /// Numbers convert between integer and float types where serde allows
    /// it; anything else of the wrong shape imports as `None`.
    pub fn cast() -> Self {
        Self::try_new(
            |value| serde_json::from_value(value.clone()).map_err(FieldError::from),
            |value| serde_json::to_value(value).map_err(FieldError::from),
        )
    }
}

/// A value type that knows its own wire conversion.
///
/// `Field::automatic` uses it as the default transformer.
pub trait ValueTransformable: Sized {
    fn value_transformer() -> ValueTransformer<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cast_accepts_integers_for_floats() {
        let transformer = ValueTransformer::<f32>::cast();
        assert_eq!(transformer.import_value(Some(&json!(3.0))), Some(3.0));
        assert_eq!(transformer.import_value(Some(&json!(2))), Some(2.0));
        assert_eq!(transformer.import_value(Some(&json!("2"))), None);
    }

    #[test]
    fn absent_and_null_import_as_none() {
        let transformer = ValueTransformer::<String>::cast();
        assert_eq!(transformer.import_value(None), None);
        assert_eq!(transformer.import_value(Some(&Value::Null)), None);
    }

    #[test]
    fn explicit_null_is_distinguishable() {
        let transformer = ValueTransformer::<String>::cast();
        assert_eq!(transformer.export_value(None, false), None);
        assert_eq!(transformer.export_value(None, true), Some(Value::Null));
        assert_eq!(
            transformer.export_value(Some(&"x".to_string()), true),
            Some(json!("x"))
        );
    }

    #[test]
    fn empty_transformer_maps_everything_to_nothing() {
        let transformer = ValueTransformer::<i32>::empty();
        assert_eq!(transformer.import_value(Some(&json!(1))), None);
        assert_eq!(transformer.export_value(Some(&1), false), None);
        assert_eq!(transformer.export_value(Some(&1), true), Some(Value::Null));
    }

    #[test]
    fn closure_pair_transformer() {
        let transformer = ValueTransformer::new(
            |value: &Value| value.as_str().map(|s| s.len()),
            |len: &usize| Some(json!("x".repeat(*len))),
        );
        assert_eq!(transformer.import_value(Some(&json!("abcd"))), Some(4));
        assert_eq!(transformer.import_value(Some(&json!(4))), None);
        assert_eq!(transformer.export_value(Some(&3), false), Some(json!("xxx")));
    }
}
