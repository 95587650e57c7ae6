//! Typed dependency on another resource.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SdkError;

use super::format_resource_id;

fn marker_default() -> bool {
    true
}

/// Typed dependency on another resource for whole-instance access.
///
/// Use this when a handler needs the full resource object (config, outputs)
/// rather than a single field value. The runtime populates the dependency
/// before invoking lifecycle handlers; [`Dependency::resolve`] returns that
/// pre-resolved instance.
///
/// Serializes to the dependency marker
/// `{"__dependency__": true, "provider", "resource", "name"}`; the resolved
/// cache never serializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Dependency<R> {
    #[serde(rename = "__dependency__", default = "marker_default")]
    dependency_marker: bool,
    pub provider: String,
    pub resource: String,
    pub name: String,
    #[serde(skip)]
    resolved: Option<Arc<R>>,
}

impl<R> Dependency<R> {
    /// Declare a dependency on the resource identified by the triple.
    pub fn new(
        provider: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            dependency_marker: true,
            provider: provider.into(),
            resource: resource.into(),
            name: name.into(),
            resolved: None,
        }
    }

    /// Unique resource ID for the referenced resource.
    pub fn id(&self) -> String {
        format_resource_id(&self.provider, &self.resource, &self.name)
    }

    /// Whether the runtime has populated this dependency.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Populate the resolved instance.
    ///
    /// Called by the runtime before handler entry, once the referenced
    /// resource is READY.
    pub fn populate(&mut self, instance: Arc<R>) {
        self.resolved = Some(instance);
    }

    /// The resolved resource instance.
    ///
    /// Side-effect-free and repeatable: every call returns the same cached
    /// instance. Errors when the runtime has not populated the dependency,
    /// typically because the referenced resource is not yet READY.
    pub fn resolve(&self) -> Result<Arc<R>, SdkError> {
        match &self.resolved {
            Some(instance) => Ok(Arc::clone(instance)),
            None => Err(SdkError::UnresolvedDependency { id: self.id() }),
        }
    }
}
