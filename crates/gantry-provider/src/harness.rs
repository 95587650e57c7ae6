//! Deterministic lifecycle harness for provider tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use gantry_core::context::{
    AmbientScope, ApplyRequest, ContextGuard, OwnerGuard, RuntimeContext, StateSnapshot,
};
use gantry_core::error::SdkError;
use gantry_core::resource::{Resource, ResourceKind};
use gantry_core::types::{EventType, LifecycleState, ProviderResponse, ResponseStatus};

/// Seeded behavior for one resource id in the harness context.
enum SeededState {
    Snapshot(StateSnapshot),
    TimedOut,
    Failed(String),
}

/// In-memory runtime context backing the harness.
///
/// Records every apply payload in arrival order and answers state waits
/// from a seeded table, so tests are fully deterministic: nothing sleeps,
/// nothing touches the network. Unseeded ids resolve immediately at the
/// requested target state with no outputs.
pub struct HarnessRuntimeContext {
    applied: RwLock<Vec<ApplyRequest>>,
    states: RwLock<HashMap<String, SeededState>>,
}

impl HarnessRuntimeContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            applied: RwLock::new(Vec::new()),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty context behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed the snapshot returned when `resource_id` is waited on.
    pub fn seed_state(&self, resource_id: impl Into<String>, snapshot: StateSnapshot) {
        self.states
            .write()
            .expect("harness state lock poisoned")
            .insert(resource_id.into(), SeededState::Snapshot(snapshot));
    }

    /// Seed a remote failure for `resource_id`.
    pub fn seed_failure(&self, resource_id: impl Into<String>, detail: impl Into<String>) {
        self.states
            .write()
            .expect("harness state lock poisoned")
            .insert(resource_id.into(), SeededState::Failed(detail.into()));
    }

    /// Seed a wait timeout for `resource_id`.
    pub fn seed_timeout(&self, resource_id: impl Into<String>) {
        self.states
            .write()
            .expect("harness state lock poisoned")
            .insert(resource_id.into(), SeededState::TimedOut);
    }

    /// Apply payloads recorded so far, in arrival order.
    pub fn applied(&self) -> Vec<ApplyRequest> {
        self.applied
            .read()
            .expect("harness applied lock poisoned")
            .clone()
    }

    fn clear(&self) {
        self.applied
            .write()
            .expect("harness applied lock poisoned")
            .clear();
        self.states
            .write()
            .expect("harness state lock poisoned")
            .clear();
    }
}

impl Default for HarnessRuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeContext for HarnessRuntimeContext {
    async fn apply_resource(&self, request: ApplyRequest) -> Result<(), SdkError> {
        tracing::debug!(
            resource = %request.resource,
            name = %request.name,
            "harness recorded apply"
        );
        self.applied
            .write()
            .map_err(|e| SdkError::Context(e.to_string()))?
            .push(request);
        Ok(())
    }

    async fn wait_for_state(
        &self,
        resource_id: &str,
        target: LifecycleState,
        timeout: Duration,
    ) -> Result<StateSnapshot, SdkError> {
        let states = self
            .states
            .read()
            .map_err(|e| SdkError::Context(e.to_string()))?;
        match states.get(resource_id) {
            Some(SeededState::Snapshot(snapshot)) => Ok(snapshot.clone()),
            Some(SeededState::TimedOut) => Err(SdkError::WaitTimedOut {
                resource_id: resource_id.to_string(),
                timeout_secs: timeout.as_secs_f64(),
            }),
            Some(SeededState::Failed(detail)) => Err(SdkError::ResourceFailed {
                resource_id: resource_id.to_string(),
                detail: detail.clone(),
            }),
            None => Ok(StateSnapshot {
                lifecycle_state: target,
                outputs: None,
            }),
        }
    }
}

/// One dispatched lifecycle event, as seen by the harness.
#[derive(Debug, Clone)]
pub struct HarnessEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub resource_id: String,
    pub name: String,
    pub config: Value,
    pub timestamp: DateTime<Utc>,
}

/// Typed result of one harness invocation.
#[derive(Debug, Clone)]
pub struct Invocation<K: ResourceKind> {
    /// The instance the handler ran against, as left by the handler.
    pub resource: Resource<K>,
    /// Handler outputs; `None` for deletes and for failures.
    pub outputs: Option<K::Outputs>,
    /// Captured handler error, if the invocation failed.
    pub error: Option<String>,
}

impl<K: ResourceKind> Invocation<K> {
    /// Whether the handler completed without error.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the handler failed.
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Deterministic driver for lifecycle handlers.
///
/// Supplies its own in-memory [`RuntimeContext`], dispatches create/update/
/// delete against resource types, and records every event and result for
/// assertions. Handler errors are captured into failure results, never
/// re-raised: the harness is the boundary that converts errors into data.
pub struct ProviderHarness {
    context: Arc<HarnessRuntimeContext>,
    events: Vec<HarnessEvent>,
    results: Vec<ProviderResponse>,
}

const HARNESS_TENANT: &str = "harness";

impl ProviderHarness {
    /// Create a harness with an empty history.
    pub fn new() -> Self {
        Self {
            context: HarnessRuntimeContext::shared(),
            events: Vec::new(),
            results: Vec::new(),
        }
    }

    /// The harness's runtime context, for seeding states and inspecting
    /// recorded apply payloads.
    pub fn context(&self) -> Arc<HarnessRuntimeContext> {
        Arc::clone(&self.context)
    }

    /// Events dispatched so far, in call order.
    pub fn events(&self) -> &[HarnessEvent] {
        &self.events
    }

    /// Results captured so far, in call order.
    pub fn results(&self) -> &[ProviderResponse] {
        &self.results
    }

    /// Discard all recorded history.
    pub fn clear(&mut self) {
        self.events.clear();
        self.results.clear();
        self.context.clear();
    }

    /// Dispatch `on_create` for a fresh instance.
    pub async fn invoke_create<K: ResourceKind>(
        &mut self,
        name: &str,
        config: K::Config,
    ) -> Invocation<K> {
        let mut resource = Resource::<K>::new(name, config);
        resource.lifecycle_state = LifecycleState::Processing;
        let event_id = self.record_event(EventType::Create, &resource);

        let context: Arc<dyn RuntimeContext> = self.context();
        let owner = resource.owner_reference();
        let handler_result: Result<K::Outputs, String> = AmbientScope::enter(async {
            let _context_guard = ContextGuard::bind(context).map_err(|e| e.to_string())?;
            let _owner_guard = OwnerGuard::bind(owner).map_err(|e| e.to_string())?;
            K::on_create(&mut resource).await.map_err(|e| e.to_string())
        })
        .await;

        let invocation = match handler_result {
            Ok(outputs) => {
                tracing::info!(resource_id = %resource.id(), "create handler succeeded");
                Invocation {
                    resource,
                    outputs: Some(outputs),
                    error: None,
                }
            }
            Err(message) => {
                tracing::warn!(
                    resource_id = %resource.id(),
                    error = %message,
                    "create handler failed"
                );
                Invocation {
                    resource,
                    outputs: None,
                    error: Some(message),
                }
            }
        };
        self.record_result(event_id, EventType::Create, &invocation);
        invocation
    }

    /// Dispatch `on_update` with the previous configuration and the outputs
    /// currently known for the instance.
    pub async fn invoke_update<K: ResourceKind>(
        &mut self,
        name: &str,
        config: K::Config,
        previous_config: K::Config,
        current_outputs: Option<K::Outputs>,
    ) -> Invocation<K> {
        let mut resource = Resource::<K>::new(name, config);
        resource.outputs = current_outputs;
        resource.lifecycle_state = LifecycleState::Processing;
        let event_id = self.record_event(EventType::Update, &resource);

        let context: Arc<dyn RuntimeContext> = self.context();
        let owner = resource.owner_reference();
        let handler_result: Result<K::Outputs, String> = AmbientScope::enter(async {
            let _context_guard = ContextGuard::bind(context).map_err(|e| e.to_string())?;
            let _owner_guard = OwnerGuard::bind(owner).map_err(|e| e.to_string())?;
            K::on_update(&mut resource, &previous_config)
                .await
                .map_err(|e| e.to_string())
        })
        .await;

        let invocation = match handler_result {
            Ok(outputs) => {
                tracing::info!(resource_id = %resource.id(), "update handler succeeded");
                Invocation {
                    resource,
                    outputs: Some(outputs),
                    error: None,
                }
            }
            Err(message) => {
                tracing::warn!(
                    resource_id = %resource.id(),
                    error = %message,
                    "update handler failed"
                );
                Invocation {
                    resource,
                    outputs: None,
                    error: Some(message),
                }
            }
        };
        self.record_result(event_id, EventType::Update, &invocation);
        invocation
    }

    /// Dispatch `on_delete`; the success result carries no outputs.
    pub async fn invoke_delete<K: ResourceKind>(
        &mut self,
        name: &str,
        config: K::Config,
    ) -> Invocation<K> {
        let mut resource = Resource::<K>::new(name, config);
        resource.lifecycle_state = LifecycleState::Processing;
        let event_id = self.record_event(EventType::Delete, &resource);

        let context: Arc<dyn RuntimeContext> = self.context();
        let owner = resource.owner_reference();
        let handler_result: Result<(), String> = AmbientScope::enter(async {
            let _context_guard = ContextGuard::bind(context).map_err(|e| e.to_string())?;
            let _owner_guard = OwnerGuard::bind(owner).map_err(|e| e.to_string())?;
            K::on_delete(&mut resource).await.map_err(|e| e.to_string())
        })
        .await;

        let invocation = match handler_result {
            Ok(()) => {
                tracing::info!(resource_id = %resource.id(), "delete handler succeeded");
                Invocation {
                    resource,
                    outputs: None,
                    error: None,
                }
            }
            Err(message) => {
                tracing::warn!(
                    resource_id = %resource.id(),
                    error = %message,
                    "delete handler failed"
                );
                Invocation {
                    resource,
                    outputs: None,
                    error: Some(message),
                }
            }
        };
        self.record_result(event_id, EventType::Delete, &invocation);
        invocation
    }

    fn record_event<K: ResourceKind>(
        &mut self,
        event_type: EventType,
        resource: &Resource<K>,
    ) -> String {
        let event_id = uuid::Uuid::new_v4().to_string();
        let config = serde_json::to_value(&resource.config).unwrap_or(Value::Null);
        self.events.push(HarnessEvent {
            event_id: event_id.clone(),
            event_type,
            resource_id: resource.id(),
            name: resource.name.clone(),
            config,
            timestamp: Utc::now(),
        });
        event_id
    }

    fn record_result<K: ResourceKind>(
        &mut self,
        event_id: String,
        event_type: EventType,
        invocation: &Invocation<K>,
    ) {
        let status = if invocation.success() {
            ResponseStatus::Success
        } else {
            ResponseStatus::Failure
        };
        let outputs = invocation
            .outputs
            .as_ref()
            .and_then(|outputs| serde_json::to_value(outputs).ok());
        self.results.push(ProviderResponse {
            event_id,
            event_type,
            resource_id: invocation.resource.id(),
            tenant_id: HARNESS_TENANT.to_string(),
            status,
            outputs,
            error: invocation.error.clone(),
            timestamp: Utc::now(),
        });
    }
}

impl Default for ProviderHarness {
    fn default() -> Self {
        Self::new()
    }
}
