//! Lifecycle event and provider response shapes.
//!
//! These are the payloads the core exchanges with external collaborators:
//! a provider reports the outcome of every lifecycle event it processed,
//! and a registry exports definitions for its registered resource types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource lifecycle event type: CREATE, UPDATE, or DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

/// Provider response status: success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Provider response reporting the outcome of a lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub event_id: String,
    pub event_type: EventType,
    pub resource_id: String,
    pub tenant_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProviderResponse {
    /// Whether the lifecycle event succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Whether the lifecycle event failed.
    pub fn is_failure(&self) -> bool {
        self.status == ResponseStatus::Failure
    }
}

/// Metadata about a registered resource type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub provider: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceDefinition {
    /// Create a bare definition for a `(provider, resource)` pair.
    pub fn new(provider: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            resource: resource.into(),
            schema: None,
            description: None,
            tags: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Unique resource definition ID: `resource_definition:{provider}_{resource}`.
    pub fn id(&self) -> String {
        format!("resource_definition:{}_{}", self.provider, self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_values_are_uppercase() {
        assert_eq!(serde_json::to_value(EventType::Create).unwrap(), json!("CREATE"));
        assert_eq!(serde_json::to_value(EventType::Update).unwrap(), json!("UPDATE"));
        assert_eq!(serde_json::to_value(EventType::Delete).unwrap(), json!("DELETE"));
    }

    #[test]
    fn test_response_status_wire_values_are_lowercase() {
        assert_eq!(serde_json::to_value(ResponseStatus::Success).unwrap(), json!("success"));
        assert_eq!(serde_json::to_value(ResponseStatus::Failure).unwrap(), json!("failure"));
    }

    #[test]
    fn test_provider_response_status_helpers() {
        let response = ProviderResponse {
            event_id: "evt-1".to_string(),
            event_type: EventType::Create,
            resource_id: "resource:test_stub_r1".to_string(),
            tenant_id: "tenant".to_string(),
            status: ResponseStatus::Success,
            outputs: Some(json!({"url": "https://r1.example.com"})),
            error: None,
            timestamp: Utc::now(),
        };
        assert!(response.is_success());
        assert!(!response.is_failure());
    }

    #[test]
    fn test_resource_definition_id() {
        let definition = ResourceDefinition::new("postgres", "database");
        assert_eq!(definition.id(), "resource_definition:postgres_database");
    }
}
