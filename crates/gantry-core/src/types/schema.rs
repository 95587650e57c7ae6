//! Configuration and output schema contracts.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

use super::FieldReference;

/// Contract for resource configuration schemas.
///
/// Implementors derive serde with `#[serde(deny_unknown_fields)]` so that
/// undeclared fields fail at decode time instead of drifting silently.
pub trait Config: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Contract for resource outputs produced by lifecycle handlers.
pub trait Outputs: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Config field that accepts a direct value or a reference to another
/// resource's output field.
///
/// Deserialization tries the reference shape first, so a field-reference
/// object never collapses into a value type that happens to accept maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field<T> {
    Reference(FieldReference),
    Value(T),
}

impl<T> Field<T> {
    /// Wrap a reference to another resource's output field.
    pub fn reference(reference: FieldReference) -> Self {
        Field::Reference(reference)
    }

    /// Direct value, if this field is not a reference.
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Field::Value(value) => Some(value),
            Field::Reference(_) => None,
        }
    }

    /// The field reference, if any.
    pub fn as_reference(&self) -> Option<&FieldReference> {
        match self {
            Field::Reference(reference) => Some(reference),
            Field::Value(_) => None,
        }
    }

    /// Whether this field still points at another resource's output.
    pub fn is_reference(&self) -> bool {
        matches!(self, Field::Reference(_))
    }

    /// Direct value, or a validation error for an unsubstituted reference.
    pub fn value(&self) -> Result<&T, SdkError> {
        match self {
            Field::Value(value) => Ok(value),
            Field::Reference(reference) => Err(SdkError::Validation(format!(
                "field references '{}' ({}) and has not been substituted",
                reference.id(),
                reference.field
            ))),
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<T: Default> Default for Field<T> {
    fn default() -> Self {
        Field::Value(T::default())
    }
}
