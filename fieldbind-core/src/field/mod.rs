//! Fields
//!
//! Fields are typed, observable value holders for model properties. Each
//! tracks whether it has been loaded, caches its validation verdict, and
//! knows how to read and write itself in a payload.
//!
//! # Flavours
//!
//! - [`BaseField`]: the value holder itself.
//! - [`Field`]: adds named value transformers and payload conversion.
//! - [`ArrayField`]: a vector of values with per-element hooks, conversion
//!   and validation.
//! - [`ModelField`]: a nested [`FieldModel`].
//!
//! All of them are observable and can observe each other; see
//! [`crate::reactive`].

mod any;
mod array;
mod base;
#[allow(clippy::module_inception)]
mod field;
mod model;
mod state;

pub use any::{ErasedField, FieldType, SeenFields};
pub use array::ArrayField;
pub use base::{BaseField, FieldBuilder, FieldValue};
pub use field::{EnumField, Field};
pub use model::{ExportOptions, FieldModel, ModelField, ModelRef};
pub use state::{LoadState, ValidationState};
