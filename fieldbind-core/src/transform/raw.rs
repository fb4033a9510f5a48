//! Raw-value transformers for enumerations.

use std::any::type_name;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ValueTransformer;
use crate::error::FieldError;

/// A type with a lossless mapping to and from a primitive raw value.
///
/// Typically a fieldless enum backed by a string or integer code:
///
/// ```rust,ignore
/// #[derive(Clone, Copy, PartialEq)]
/// enum Color { Red, Blue }
///
/// impl RawRepresentable for Color {
///     type Raw = String;
///
///     fn raw_value(&self) -> String {
///         match self {
///             Color::Red => "red".into(),
///             Color::Blue => "blue".into(),
///         }
///     }
///
///     fn from_raw(raw: String) -> Option<Self> {
///         match raw.as_str() {
///             "red" => Some(Color::Red),
///             "blue" => Some(Color::Blue),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait RawRepresentable: Sized {
    type Raw: Serialize + DeserializeOwned;

    fn raw_value(&self) -> Self::Raw;

    fn from_raw(raw: Self::Raw) -> Option<Self>;
}

impl<T> ValueTransformer<T>
where
    T: RawRepresentable + 'static,
{
    /// Imports by parsing the raw value and looking up the variant; exports
    /// the variant's raw value.
    pub fn raw() -> Self {
        Self::try_new(
            |value| {
                let raw: T::Raw = serde_json::from_value(value.clone())?;
                T::from_raw(raw).ok_or_else(|| FieldError::UnknownRawValue {
                    raw: value.to_string(),
                    target: type_name::<T>(),
                })
            },
            |value| Ok(serde_json::to_value(value.raw_value())?),
        )
    }
}
