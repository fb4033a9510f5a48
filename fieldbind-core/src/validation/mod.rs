//! Validation
//!
//! Rules attach to fields through `require`. Running them is lazy: a field
//! validates on demand and caches the verdict until its value is written
//! again or its state is reset. Failures are data, reported as the ordered
//! list of every failing rule's message.

mod rule;

pub use rule::{
    LengthRule, NotBlankRule, RangeRule, TransformerRule, ValidationRule, DEFAULT_MESSAGE,
};
