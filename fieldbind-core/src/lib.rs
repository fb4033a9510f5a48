//! Fieldbind Core
//!
//! This crate provides reactive fields for model properties. It implements:
//!
//! - Typed, observable value holders with load and validation state
//! - Push-based observation, two-way binding and transformation chains
//! - Declarative validation rules
//! - Conversion to and from loosely typed JSON payloads
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: observables, observers, observation registries, bindings
//! - `field`: the field flavours, the type-erased field view and models
//! - `validation`: validation rules
//! - `transform`: value transformers between field values and wire values
//! - `error`: errors reported by transformers
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldbind_core::prelude::*;
//!
//! let first = Field::<String>::new().with_key("first_name");
//! let display = Field::<String>::new();
//!
//! // `display` follows an uppercased copy of `first`.
//! first
//!     .map(|name| name.map(|n| n.to_uppercase()))
//!     .add_observer(&display);
//!
//! first.set("ada".into());
//! assert_eq!(display.value().as_deref(), Some("ADA"));
//! ```

pub mod error;
pub mod field;
pub mod reactive;
pub mod transform;
pub mod validation;

pub use error::{FieldError, Result};

/// The types and traits most code needs.
pub mod prelude {
    pub use crate::field::{
        ArrayField, BaseField, EnumField, ExportOptions, Field, FieldBuilder, FieldModel, FieldType,
        LoadState, ModelField, ModelRef, SeenFields, ValidationState,
    };
    pub use crate::reactive::{
        bind_from, bind_mutual, bind_mutual_with, chain, observe, unobserve, AsObserver, Converge,
        Observable, Observation, Transformation,
    };
    pub use crate::transform::{
        DateTransformer, Payload, RawRepresentable, ValueTransformable, ValueTransformer,
    };
    pub use crate::validation::{LengthRule, NotBlankRule, RangeRule, TransformerRule, ValidationRule};
}
