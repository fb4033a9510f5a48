//! Validation rules.
//!
//! A [`ValidationRule`] is a predicate, a message, and a nil policy. The
//! richer rules in this module ([`RangeRule`], [`TransformerRule`],
//! [`LengthRule`], [`NotBlankRule`]) are plain builders that convert into a
//! `ValidationRule`, so a field only ever stores one rule type.

use std::fmt::Display;
use std::sync::Arc;

/// Message used when a rule is built without one.
pub const DEFAULT_MESSAGE: &str = "Value is invalid";

type Check<T> = Arc<dyn Fn(&T, &str) -> Result<(), String> + Send + Sync>;

/// A single validation predicate.
///
/// Immutable once built; cloning shares the predicate.
pub struct ValidationRule<T> {
    check: Check<T>,
    message: String,
    allow_nil: bool,
}

impl<T: 'static> ValidationRule<T> {
    /// A rule passing when `test` returns true. Nil values pass.
    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_check(move |value, message| {
            if test(value) {
                Ok(())
            } else {
                Err(message.to_string())
            }
        })
    }

    /// A rule whose check produces its own failure message.
    ///
    /// The closure receives the value and the rule's configured message.
    pub fn from_check<F>(check: F) -> Self
    where
        F: Fn(&T, &str) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
            message: DEFAULT_MESSAGE.to_string(),
            allow_nil: true,
        }
    }

    /// A rule that rejects nil and accepts every present value.
    pub fn not_nil() -> Self {
        Self::new(|_| true).with_message("is required").allow_nil(false)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Whether a nil value passes this rule.
    pub fn allow_nil(mut self, allow_nil: bool) -> Self {
        self.allow_nil = allow_nil;
        self
    }
}

impl<T> ValidationRule<T> {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn allows_nil(&self) -> bool {
        self.allow_nil
    }

    /// Check `value`, returning the failure message if it does not pass.
    pub fn validate(&self, value: Option<&T>) -> Result<(), String> {
        match value {
            Some(value) => (self.check)(value, &self.message),
            None if self.allow_nil => Ok(()),
            None => Err(self.message.clone()),
        }
    }

    pub fn test(&self, value: Option<&T>) -> bool {
        self.validate(value).is_ok()
    }
}

impl<T> Clone for ValidationRule<T> {
    fn clone(&self) -> Self {
        Self {
            check: Arc::clone(&self.check),
            message: self.message.clone(),
            allow_nil: self.allow_nil,
        }
    }
}

impl<T> std::fmt::Debug for ValidationRule<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRule")
            .field("message", &self.message)
            .field("allow_nil", &self.allow_nil)
            .finish_non_exhaustive()
    }
}

/// Bounds check against an optional minimum and maximum, both inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRule<T> {
    minimum: Option<T>,
    maximum: Option<T>,
}

impl<T> RangeRule<T> {
    pub fn new(minimum: Option<T>, maximum: Option<T>) -> Self {
        Self { minimum, maximum }
    }

    pub fn at_least(minimum: T) -> Self {
        Self::new(Some(minimum), None)
    }

    pub fn at_most(maximum: T) -> Self {
        Self::new(None, Some(maximum))
    }

    pub fn between(minimum: T, maximum: T) -> Self {
        Self::new(Some(minimum), Some(maximum))
    }
}

impl<T> From<RangeRule<T>> for ValidationRule<T>
where
    T: PartialOrd + Display + Send + Sync + 'static,
{
    fn from(range: RangeRule<T>) -> Self {
        ValidationRule::from_check(move |value: &T, _| {
            if let Some(minimum) = &range.minimum {
                if value < minimum {
                    return Err(format!("Value must be greater than {minimum}"));
                }
            }
            if let Some(maximum) = &range.maximum {
                if value > maximum {
                    return Err(format!("Value must be less than {maximum}"));
                }
            }
            Ok(())
        })
    }
}

/// Applies a conversion, then validates the converted value with an inner
/// rule. A conversion yielding `None` is judged by the inner rule's nil
/// policy.
pub struct TransformerRule<In, Out> {
    transform: Arc<dyn Fn(&In) -> Option<Out> + Send + Sync>,
    rule: ValidationRule<Out>,
}

impl<In, Out> TransformerRule<In, Out> {
    pub fn new<F>(transform: F, rule: impl Into<ValidationRule<Out>>) -> Self
    where
        F: Fn(&In) -> Option<Out> + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
            rule: rule.into(),
        }
    }
}

impl<In, Out> From<TransformerRule<In, Out>> for ValidationRule<In>
where
    In: 'static,
    Out: 'static,
{
    fn from(rule: TransformerRule<In, Out>) -> Self {
        let TransformerRule { transform, rule } = rule;
        ValidationRule::from_check(move |value: &In, _| rule.validate(transform(value).as_ref()))
    }
}

/// Character-count bounds for strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthRule {
    minimum: Option<usize>,
    maximum: Option<usize>,
}

impl LengthRule {
    pub fn new(minimum: Option<usize>, maximum: Option<usize>) -> Self {
        Self { minimum, maximum }
    }
}

impl From<LengthRule> for ValidationRule<String> {
    fn from(length: LengthRule) -> Self {
        TransformerRule::new(
            |text: &String| Some(text.chars().count()),
            RangeRule::new(length.minimum, length.maximum),
        )
        .into()
    }
}

/// Rejects strings that are empty or only whitespace. Nil passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotBlankRule;

impl From<NotBlankRule> for ValidationRule<String> {
    fn from(_: NotBlankRule) -> Self {
        ValidationRule::new(|text: &String| !text.trim().is_empty()).with_message("must not be blank")
    }
}
