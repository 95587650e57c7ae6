//! # Gantry Provider
//!
//! Registry and deterministic test harness for Gantry resource types.
//!
//! This crate provides:
//! - Provider: named, append-only registry of resource type descriptors
//! - discover_resources: collection of registered types across providers
//! - ProviderHarness: in-memory lifecycle driver for tests

mod harness;
mod registry;

pub use harness::{HarnessEvent, HarnessRuntimeContext, Invocation, ProviderHarness};
pub use registry::{
    discover_resources, is_registered, DispatchOutcome, Provider, RegistryError,
    ResourceDescriptor,
};

// Re-export core types for convenience
pub use gantry_core::{
    ApplyRequest, Config, HandlerError, LifecycleState, Outputs, Resource, ResourceKind,
    RuntimeContext, SdkError, StateSnapshot,
};
