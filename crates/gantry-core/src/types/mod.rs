//! Core type definitions for Gantry
//!
//! This module contains the fundamental types used throughout the system:
//! - LifecycleState: resource lifecycle state machine
//! - ResourceReference / FieldReference / OwnerReference: cross-resource keys
//! - Dependency: typed whole-resource reference resolved by the runtime
//! - Config / Outputs / Field: schema contracts for resource payloads

mod dependency;
mod reference;
mod response;
mod schema;
mod state;

pub use dependency::Dependency;
pub use reference::{
    is_dependency_marker, is_field_ref_marker, FieldReference, OwnerReference, ResolvedFieldRef,
    ResourceReference, DEPENDENCY_MARKER_KEY, FIELD_REF_MARKER_KEY,
};
pub use response::{EventType, ProviderResponse, ResourceDefinition, ResponseStatus};
pub use schema::{Config, Field, Outputs};
pub use state::{format_resource_id, LifecycleState};
