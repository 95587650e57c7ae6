//! Reference types for cross-resource relationships.
//!
//! - ResourceReference: "resource X needs resource Y" (dependency tracking)
//! - FieldReference: one output field of another resource
//! - OwnerReference: "resource X was created/managed by resource Y"
//!
//! Ownership and dependency are orthogonal relations over the same identity
//! space: the reference kinds are distinct types but derive the same id from
//! identical triples.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::format_resource_id;

/// Key marking a serialized dependency payload.
pub const DEPENDENCY_MARKER_KEY: &str = "__dependency__";
/// Key marking a resolved field-reference payload.
pub const FIELD_REF_MARKER_KEY: &str = "__field_ref__";

/// Reference to another resource for dependency tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    pub provider: String,
    pub resource: String,
    pub name: String,
}

impl ResourceReference {
    /// Create a new resource reference
    pub fn new(
        provider: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Unique resource ID for the referenced resource.
    pub fn id(&self) -> String {
        format_resource_id(&self.provider, &self.resource, &self.name)
    }
}

/// Reference to a specific output field of another resource.
///
/// `field` is a dotted path such as `outputs.connection_url`, used for
/// just-in-time value lookups rather than whole-object access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldReference {
    pub provider: String,
    pub resource: String,
    pub name: String,
    pub field: String,
}

impl FieldReference {
    /// Create a new field reference
    pub fn new(
        provider: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            resource: resource.into(),
            name: name.into(),
            field: field.into(),
        }
    }

    /// Unique resource ID for the referenced resource.
    pub fn id(&self) -> String {
        format_resource_id(&self.provider, &self.resource, &self.name)
    }
}

/// Reference recording which resource created/manages another.
///
/// Structurally identical to [`ResourceReference`] but kept as a distinct
/// type: ownership is not data access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerReference {
    pub provider: String,
    pub resource: String,
    pub name: String,
}

impl OwnerReference {
    /// Create a new owner reference
    pub fn new(
        provider: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Unique resource ID for the owning resource.
    pub fn id(&self) -> String {
        format_resource_id(&self.provider, &self.resource, &self.name)
    }
}

impl From<&ResourceReference> for OwnerReference {
    fn from(reference: &ResourceReference) -> Self {
        Self::new(
            reference.provider.clone(),
            reference.resource.clone(),
            reference.name.clone(),
        )
    }
}

/// Check whether a decoded value is a serialized dependency marker.
///
/// A dependency marker is any object carrying at least
/// `{"__dependency__": true, "provider", "resource", "name"}`. Extra keys
/// (e.g. a post-resolution `ref` payload) are permitted and ignored.
/// Non-object values never match.
pub fn is_dependency_marker(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    if map.get(DEPENDENCY_MARKER_KEY).and_then(Value::as_bool) != Some(true) {
        return false;
    }
    ["provider", "resource", "name"]
        .iter()
        .all(|key| map.contains_key(*key))
}

/// Check whether a decoded value is a resolved field-reference marker.
///
/// The field-ref marker is exact: `{"__field_ref__": true, "ref": <object>,
/// "resolved_value": <any>}` with no extra keys. Non-object values never
/// match.
pub fn is_field_ref_marker(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    map.len() == 3
        && map.get(FIELD_REF_MARKER_KEY).and_then(Value::as_bool) == Some(true)
        && map.get("ref").map(Value::is_object).unwrap_or(false)
        && map.contains_key("resolved_value")
}

/// Wire form of a field reference after the runtime substitutes its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFieldRef {
    #[serde(rename = "__field_ref__")]
    pub field_ref_marker: bool,
    #[serde(rename = "ref")]
    pub reference: FieldReference,
    pub resolved_value: Value,
}

impl ResolvedFieldRef {
    /// Create a resolved field reference
    pub fn new(reference: FieldReference, resolved_value: Value) -> Self {
        Self {
            field_ref_marker: true,
            reference,
            resolved_value,
        }
    }
}
