//! Runtime context protocol and ambient propagation.
//!
//! A lifecycle handler never holds an explicit handle to the orchestration
//! client. Instead, the dispatcher binds a [`RuntimeContext`] (and the owner
//! on whose behalf the handler runs) into task-local ambient storage for the
//! duration of the invocation; `Resource::apply` and `Resource::wait_ready`
//! read it back from there.
//!
//! The storage is task-local, not process-global: two lifecycle invocations
//! running concurrently under different owners never observe each other's
//! bindings. Each invocation gets its own storage via
//! [`AmbientScope::enter`]; within it, `set_*` operations return restore
//! tokens and the guard types restore bindings on every exit path.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SdkError;
use crate::types::{LifecycleState, OwnerReference};

/// Default timeout for readiness waits.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Serialized resource payload handed to [`RuntimeContext::apply_resource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub provider: String,
    pub resource: String,
    pub name: String,
    pub config: Value,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Snapshot returned by [`RuntimeContext::wait_for_state`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub lifecycle_state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
}

/// Operations a lifecycle handler can request from the orchestration
/// runtime.
///
/// Implemented by the transport layer in production and by the provider
/// harness in tests.
#[async_trait]
pub trait RuntimeContext: Send + Sync {
    /// Submit a resource for reconciliation. Errors propagate verbatim to
    /// the caller; the core neither suppresses nor retries them.
    async fn apply_resource(&self, request: ApplyRequest) -> Result<(), SdkError>;

    /// Block until `resource_id` reaches `target`, fails, or `timeout`
    /// expires. Expiry surfaces as [`SdkError::WaitTimedOut`]; a remote
    /// transition to FAILED surfaces as [`SdkError::ResourceFailed`].
    async fn wait_for_state(
        &self,
        resource_id: &str,
        target: LifecycleState,
        timeout: Duration,
    ) -> Result<StateSnapshot, SdkError>;
}

#[derive(Default)]
struct AmbientState {
    context: Option<Arc<dyn RuntimeContext>>,
    owner: Option<OwnerReference>,
}

tokio::task_local! {
    static AMBIENT: RefCell<AmbientState>;
}

/// Ambient storage for one logical execution.
pub struct AmbientScope;

impl AmbientScope {
    /// Run `fut` with fresh, independent ambient storage.
    ///
    /// Dispatchers call this once per lifecycle invocation. Nested entries
    /// get their own storage, and concurrently running invocations never
    /// observe each other's bindings.
    pub async fn enter<F: Future>(fut: F) -> F::Output {
        AMBIENT.scope(RefCell::new(AmbientState::default()), fut).await
    }
}

/// Token restoring the runtime-context binding that a `set` replaced.
pub struct ContextToken {
    prior: Option<Arc<dyn RuntimeContext>>,
}

impl std::fmt::Debug for ContextToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextToken")
            .field("prior", &self.prior.as_ref().map(|_| "<runtime context>"))
            .finish()
    }
}

/// Token restoring the owner binding that a `set` replaced.
#[derive(Debug)]
pub struct OwnerToken {
    prior: Option<OwnerReference>,
}

/// Current runtime context, if one is bound.
pub fn runtime_context() -> Option<Arc<dyn RuntimeContext>> {
    AMBIENT
        .try_with(|state| state.borrow().context.clone())
        .ok()
        .flatten()
}

/// Bind the runtime context for the current task.
///
/// Returns a token that restores the previous binding; an inner binding
/// shadows an outer one until reset.
pub fn set_runtime_context(ctx: Arc<dyn RuntimeContext>) -> Result<ContextToken, SdkError> {
    AMBIENT
        .try_with(move |state| ContextToken {
            prior: state.borrow_mut().context.replace(ctx),
        })
        .map_err(|_| SdkError::AmbientStorage {
            operation: "set_runtime_context",
        })
}

/// Restore the runtime-context binding captured by `token`.
pub fn reset_runtime_context(token: ContextToken) {
    let _ = AMBIENT.try_with(move |state| {
        state.borrow_mut().context = token.prior;
    });
}

/// Current resource owner, if one is bound.
pub fn current_owner() -> Option<OwnerReference> {
    AMBIENT
        .try_with(|state| state.borrow().owner.clone())
        .ok()
        .flatten()
}

/// Bind the current resource owner for the current task.
pub fn set_current_owner(owner: OwnerReference) -> Result<OwnerToken, SdkError> {
    AMBIENT
        .try_with(move |state| OwnerToken {
            prior: state.borrow_mut().owner.replace(owner),
        })
        .map_err(|_| SdkError::AmbientStorage {
            operation: "set_current_owner",
        })
}

/// Restore the owner binding captured by `token`.
pub fn reset_current_owner(token: OwnerToken) {
    let _ = AMBIENT.try_with(move |state| {
        state.borrow_mut().owner = token.prior;
    });
}

/// Scoped runtime-context binding.
///
/// Restores the prior binding on drop, so the binding unwinds correctly on
/// every exit path, including errors.
pub struct ContextGuard {
    token: Option<ContextToken>,
}

impl ContextGuard {
    /// Bind `ctx` until the guard drops.
    pub fn bind(ctx: Arc<dyn RuntimeContext>) -> Result<Self, SdkError> {
        Ok(Self {
            token: Some(set_runtime_context(ctx)?),
        })
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            reset_runtime_context(token);
        }
    }
}

/// Scoped owner binding; restores the prior owner on drop.
pub struct OwnerGuard {
    token: Option<OwnerToken>,
}

impl OwnerGuard {
    /// Bind `owner` until the guard drops.
    pub fn bind(owner: OwnerReference) -> Result<Self, SdkError> {
        Ok(Self {
            token: Some(set_current_owner(owner)?),
        })
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            reset_current_owner(token);
        }
    }
}

/// Wait for an arbitrary resource id to reach `target` via the ambient
/// runtime context.
///
/// `timeout` defaults to [`DEFAULT_WAIT_TIMEOUT`] when not given. Fails fast
/// when no context is bound.
pub async fn wait_for_resource_state(
    resource_id: &str,
    target: LifecycleState,
    timeout: Option<Duration>,
) -> Result<StateSnapshot, SdkError> {
    let ctx = runtime_context().ok_or(SdkError::MissingContext {
        operation: "wait_for_resource_state",
    })?;
    ctx.wait_for_state(resource_id, target, timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT))
        .await
}
