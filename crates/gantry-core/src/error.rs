//! SDK error types.

use thiserror::Error;

/// Errors surfaced by the SDK core.
///
/// Nothing here is retried by the core; retry and backoff belong to the
/// transport layer.
#[derive(Debug, Error)]
pub enum SdkError {
    /// An operation that needs the ambient runtime context was called
    /// outside a lifecycle dispatch.
    #[error("{operation}() must be called from within a provider lifecycle handler")]
    MissingContext { operation: &'static str },

    /// An ambient binding was written outside an established ambient scope.
    #[error("{operation}() requires ambient storage; enter it with AmbientScope::enter")]
    AmbientStorage { operation: &'static str },

    /// The runtime did not populate a dependency before handler entry.
    #[error("dependency '{id}' not resolved; the referenced resource may not be READY yet")]
    UnresolvedDependency { id: String },

    /// Construction-time schema violation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Payload encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A wait expired before the target state was reached.
    #[error("timed out after {timeout_secs}s waiting for '{resource_id}'")]
    WaitTimedOut {
        resource_id: String,
        timeout_secs: f64,
    },

    /// The remote resource transitioned to FAILED while being waited on.
    #[error("resource '{resource_id}' failed: {detail}")]
    ResourceFailed { resource_id: String, detail: String },

    /// Error surfaced verbatim by a runtime context implementation.
    #[error("{0}")]
    Context(String),
}
