//! # Gantry Core
//!
//! Core abstractions for authoring provider-managed infrastructure resources.
//!
//! This crate contains:
//! - Lifecycle state machine and resource identity
//! - Reference types (resource / field / owner) and their wire markers
//! - Typed dependencies resolved by the runtime before handler entry
//! - The `Resource` entity with apply / wait-ready behaviors
//! - The `RuntimeContext` protocol and ambient task-local propagation
//!
//! This crate does NOT care about:
//! - How requests reach the orchestration API (transport, retries, auth)
//! - Scheduling concurrent applies across a dependency graph
//! - Server-side build/deploy machinery

pub mod context;
pub mod error;
pub mod resource;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::context::{
        current_owner, reset_current_owner, reset_runtime_context, runtime_context,
        set_current_owner, set_runtime_context, wait_for_resource_state, AmbientScope,
        ApplyRequest, ContextGuard, ContextToken, OwnerGuard, OwnerToken, RuntimeContext,
        StateSnapshot, DEFAULT_WAIT_TIMEOUT,
    };
    pub use crate::error::SdkError;
    pub use crate::resource::{HandlerError, Resource, ResourceKind};
    pub use crate::types::{
        format_resource_id, is_dependency_marker, is_field_ref_marker, Config, Dependency,
        EventType, Field, FieldReference, LifecycleState, Outputs, OwnerReference,
        ProviderResponse, ResolvedFieldRef, ResourceDefinition, ResourceReference,
        ResponseStatus,
    };
}

// Re-export key types at crate root
pub use context::{
    wait_for_resource_state, AmbientScope, ApplyRequest, ContextGuard, OwnerGuard,
    RuntimeContext, StateSnapshot,
};
pub use error::SdkError;
pub use resource::{HandlerError, Resource, ResourceKind};
pub use types::{
    format_resource_id, Config, Dependency, Field, FieldReference, LifecycleState, Outputs,
    OwnerReference, ResourceReference,
};
