//! Resource entity and lifecycle handler contract.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{self, ApplyRequest, DEFAULT_WAIT_TIMEOUT};
use crate::error::SdkError;
use crate::types::{
    format_resource_id, Config, LifecycleState, Outputs, OwnerReference, ResourceReference,
};

/// Error type lifecycle handlers may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Contract a provider-managed resource type must implement.
///
/// `PROVIDER` and `RESOURCE` are the statically declared type tags a
/// registry pairs with a dispatch descriptor; instances derive their id from
/// them.
///
/// Handlers must be idempotent. Events may be redelivered if the runtime
/// crashes after processing but before acknowledging the message, so
/// repeated invocation with identical input must be side-effect-safe and
/// produce the same observable result.
#[async_trait]
pub trait ResourceKind: Sized + Send + Sync + 'static {
    /// Provider this resource type belongs to.
    const PROVIDER: &'static str;
    /// Resource type tag, unique within the provider.
    const RESOURCE: &'static str;

    /// Configuration schema for this resource type.
    type Config: Config;
    /// Outputs produced by this resource type's handlers.
    type Outputs: Outputs;

    /// Handle resource creation.
    async fn on_create(resource: &mut Resource<Self>) -> Result<Self::Outputs, HandlerError>;

    /// Handle resource update with access to the previous configuration.
    async fn on_update(
        resource: &mut Resource<Self>,
        previous_config: &Self::Config,
    ) -> Result<Self::Outputs, HandlerError>;

    /// Handle resource deletion.
    async fn on_delete(resource: &mut Resource<Self>) -> Result<(), HandlerError>;
}

/// Provider-managed resource instance with typed config and outputs.
///
/// Constructed in DRAFT; [`Resource::apply`] is the only authoring-side
/// operation that transitions it out of DRAFT (to PENDING). State afterwards
/// advances only by copying what the orchestration system reports through
/// [`Resource::wait_ready`].
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Resource<K: ResourceKind> {
    pub name: String,
    pub config: K::Config,
    #[serde(default)]
    pub dependencies: Vec<ResourceReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<K::Outputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub lifecycle_state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl<K: ResourceKind> Resource<K> {
    /// Construct a resource in DRAFT state.
    pub fn new(name: impl Into<String>, config: K::Config) -> Self {
        Self {
            name: name.into(),
            config,
            dependencies: Vec::new(),
            outputs: None,
            error: None,
            lifecycle_state: LifecycleState::Draft,
            tags: None,
            owner_references: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Attach tags submitted with the next `apply()`.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Unique resource ID: `resource:{provider}_{resource}_{name}`.
    pub fn id(&self) -> String {
        format_resource_id(K::PROVIDER, K::RESOURCE, &self.name)
    }

    /// Reference to this resource for dependency tracking.
    pub fn reference(&self) -> ResourceReference {
        ResourceReference::new(K::PROVIDER, K::RESOURCE, self.name.clone())
    }

    /// Owner reference identifying this resource.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference::new(K::PROVIDER, K::RESOURCE, self.name.clone())
    }

    /// Record `other` as an owner of this resource.
    ///
    /// Set semantics over a sequence: duplicates are suppressed and
    /// insertion order is preserved. Chainable.
    pub fn set_owner<O: ResourceKind>(&mut self, other: &Resource<O>) -> &mut Self {
        self.add_owner_reference(other.owner_reference())
    }

    /// Record an owner by reference, suppressing duplicates.
    pub fn add_owner_reference(&mut self, owner: OwnerReference) -> &mut Self {
        if !self.owner_references.contains(&owner) {
            self.owner_references.push(owner);
        }
        self
    }

    /// Serialized apply payload for this resource.
    pub fn apply_request(&self) -> Result<ApplyRequest, SdkError> {
        Ok(ApplyRequest {
            provider: K::PROVIDER.to_string(),
            resource: K::RESOURCE.to_string(),
            name: self.name.clone(),
            config: serde_json::to_value(&self.config)
                .map_err(|e| SdkError::Serialization(e.to_string()))?,
            owner_references: self.owner_references.clone(),
            tags: self.tags.clone(),
        })
    }

    /// Submit this resource through the ambient runtime context.
    ///
    /// If an ambient current owner is bound and not already recorded, it is
    /// appended first: a resource applied from inside another resource's
    /// handler is owned by that handler's resource unless already explicitly
    /// owned. The local state moves to PENDING before the context observes
    /// the payload. Context errors propagate unchanged. Chainable.
    pub async fn apply(&mut self) -> Result<&mut Self, SdkError> {
        let ctx = context::runtime_context().ok_or(SdkError::MissingContext {
            operation: "apply",
        })?;
        if let Some(owner) = context::current_owner() {
            self.add_owner_reference(owner);
        }
        self.lifecycle_state = LifecycleState::Pending;
        let request = self.apply_request()?;
        tracing::debug!(resource_id = %self.id(), "applying resource");
        ctx.apply_resource(request).await?;
        Ok(self)
    }

    /// Wait for this resource to reach READY with the default timeout.
    pub async fn wait_ready(&mut self) -> Result<&mut Self, SdkError> {
        self.wait_ready_within(DEFAULT_WAIT_TIMEOUT).await
    }

    /// Wait for this resource to reach READY, failing once `timeout`
    /// expires.
    ///
    /// On success, copies the reported lifecycle state and, when the
    /// snapshot carries an outputs payload, replaces `outputs` with a
    /// freshly decoded instance. Timeout and remote-failure errors propagate
    /// unchanged; the core never retries.
    pub async fn wait_ready_within(&mut self, timeout: Duration) -> Result<&mut Self, SdkError> {
        let ctx = context::runtime_context().ok_or(SdkError::MissingContext {
            operation: "wait_ready",
        })?;
        let resource_id = self.id();
        let snapshot = ctx
            .wait_for_state(&resource_id, LifecycleState::Ready, timeout)
            .await?;
        tracing::debug!(
            resource_id = %resource_id,
            lifecycle_state = %snapshot.lifecycle_state,
            "wait_ready settled"
        );
        self.lifecycle_state = snapshot.lifecycle_state;
        if let Some(payload) = snapshot.outputs {
            self.outputs = Some(serde_json::from_value(payload).map_err(|e| {
                SdkError::Validation(format!("invalid outputs payload: {}", e))
            })?);
        }
        Ok(self)
    }
}

impl<K: ResourceKind> Clone for Resource<K> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            dependencies: self.dependencies.clone(),
            outputs: self.outputs.clone(),
            error: self.error.clone(),
            lifecycle_state: self.lifecycle_state,
            tags: self.tags.clone(),
            owner_references: self.owner_references.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl<K: ResourceKind> fmt::Debug for Resource<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id())
            .field("config", &self.config)
            .field("lifecycle_state", &self.lifecycle_state)
            .field("owner_references", &self.owner_references)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AmbientScope, ContextGuard, OwnerGuard, RuntimeContext, StateSnapshot};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct StubConfig {
        name: String,
        #[serde(default = "default_size")]
        size: i64,
    }

    fn default_size() -> i64 {
        10
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct StubOutputs {
        url: String,
    }

    impl Config for StubConfig {}
    impl Outputs for StubOutputs {}

    struct StubKind;

    #[async_trait]
    impl ResourceKind for StubKind {
        const PROVIDER: &'static str = "test";
        const RESOURCE: &'static str = "stub";
        type Config = StubConfig;
        type Outputs = StubOutputs;

        async fn on_create(resource: &mut Resource<Self>) -> Result<StubOutputs, HandlerError> {
            Ok(StubOutputs {
                url: format!("https://{}.example.com", resource.config.name),
            })
        }

        async fn on_update(
            resource: &mut Resource<Self>,
            _previous_config: &StubConfig,
        ) -> Result<StubOutputs, HandlerError> {
            Ok(StubOutputs {
                url: format!("https://{}.example.com/updated", resource.config.name),
            })
        }

        async fn on_delete(_resource: &mut Resource<Self>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct OtherKind;

    #[async_trait]
    impl ResourceKind for OtherKind {
        const PROVIDER: &'static str = "test";
        const RESOURCE: &'static str = "other";
        type Config = StubConfig;
        type Outputs = StubOutputs;

        async fn on_create(_resource: &mut Resource<Self>) -> Result<StubOutputs, HandlerError> {
            Ok(StubOutputs {
                url: "https://other.example.com".to_string(),
            })
        }

        async fn on_update(
            _resource: &mut Resource<Self>,
            _previous_config: &StubConfig,
        ) -> Result<StubOutputs, HandlerError> {
            Ok(StubOutputs {
                url: "https://other.example.com".to_string(),
            })
        }

        async fn on_delete(_resource: &mut Resource<Self>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct RecordingContext {
        applied: Mutex<Vec<ApplyRequest>>,
        wait_calls: Mutex<Vec<(String, LifecycleState, Duration)>>,
        snapshot: StateSnapshot,
    }

    impl RecordingContext {
        fn new(snapshot: StateSnapshot) -> Self {
            Self {
                applied: Mutex::new(Vec::new()),
                wait_calls: Mutex::new(Vec::new()),
                snapshot,
            }
        }

        fn ready() -> Self {
            Self::new(StateSnapshot {
                lifecycle_state: LifecycleState::Ready,
                outputs: None,
            })
        }
    }

    #[async_trait]
    impl RuntimeContext for RecordingContext {
        async fn apply_resource(&self, request: ApplyRequest) -> Result<(), SdkError> {
            self.applied.lock().unwrap().push(request);
            Ok(())
        }

        async fn wait_for_state(
            &self,
            resource_id: &str,
            target: LifecycleState,
            timeout: Duration,
        ) -> Result<StateSnapshot, SdkError> {
            self.wait_calls
                .lock()
                .unwrap()
                .push((resource_id.to_string(), target, timeout));
            Ok(self.snapshot.clone())
        }
    }

    fn stub_resource(name: &str) -> Resource<StubKind> {
        Resource::new(
            name,
            StubConfig {
                name: name.to_string(),
                size: 10,
            },
        )
    }

    #[test]
    fn test_new_resource_is_draft_with_derived_id() {
        let resource = stub_resource("my-resource");
        assert_eq!(resource.lifecycle_state, LifecycleState::Draft);
        assert_eq!(resource.id(), "resource:test_stub_my-resource");
        assert!(resource.owner_references.is_empty());
        assert!(resource.outputs.is_none());
    }

    #[test]
    fn test_set_owner_is_idempotent() {
        let owner = Resource::<OtherKind>::new(
            "owner",
            StubConfig {
                name: "owner".to_string(),
                size: 10,
            },
        );
        let mut resource = stub_resource("my-resource");

        resource.set_owner(&owner).set_owner(&owner).set_owner(&owner);
        assert_eq!(resource.owner_references.len(), 1);
        assert_eq!(resource.owner_references[0], owner.owner_reference());
    }

    #[test]
    fn test_set_owner_preserves_insertion_order_for_distinct_owners() {
        let first = Resource::<OtherKind>::new(
            "first",
            StubConfig {
                name: "first".to_string(),
                size: 10,
            },
        );
        let second = Resource::<OtherKind>::new(
            "second",
            StubConfig {
                name: "second".to_string(),
                size: 10,
            },
        );
        let mut resource = stub_resource("my-resource");

        resource.set_owner(&first).set_owner(&second);
        assert_eq!(
            resource.owner_references,
            vec![first.owner_reference(), second.owner_reference()]
        );
    }

    #[test]
    fn test_apply_without_context_is_a_usage_error() {
        tokio_test::block_on(async {
            let mut resource = stub_resource("my-resource");
            let err = resource.apply().await.unwrap_err();
            assert!(err
                .to_string()
                .contains("must be called from within a provider lifecycle handler"));
            // The failed apply must not have moved the resource out of DRAFT.
            assert_eq!(resource.lifecycle_state, LifecycleState::Draft);
        });
    }

    #[test]
    fn test_wait_ready_without_context_is_a_usage_error() {
        tokio_test::block_on(async {
            let mut resource = stub_resource("my-resource");
            let err = resource.wait_ready().await.unwrap_err();
            assert!(err
                .to_string()
                .contains("must be called from within a provider lifecycle handler"));
        });
    }

    #[test]
    fn test_apply_sets_pending_and_serializes_payload() {
        tokio_test::block_on(AmbientScope::enter(async {
            let ctx = Arc::new(RecordingContext::ready());
            let _guard = ContextGuard::bind(ctx.clone()).unwrap();

            let mut resource = stub_resource("my-resource").with_tags(vec!["team-a".to_string()]);
            resource.apply().await.unwrap();

            assert_eq!(resource.lifecycle_state, LifecycleState::Pending);
            let applied = ctx.applied.lock().unwrap();
            assert_eq!(applied.len(), 1);
            assert_eq!(applied[0].provider, "test");
            assert_eq!(applied[0].resource, "stub");
            assert_eq!(applied[0].name, "my-resource");
            assert_eq!(applied[0].config, json!({"name": "my-resource", "size": 10}));
            assert!(applied[0].owner_references.is_empty());
            assert_eq!(applied[0].tags, Some(vec!["team-a".to_string()]));
        }));
    }

    #[test]
    fn test_apply_appends_ambient_owner_exactly_once() {
        tokio_test::block_on(AmbientScope::enter(async {
            let ctx = Arc::new(RecordingContext::ready());
            let _context_guard = ContextGuard::bind(ctx.clone()).unwrap();
            let owner = OwnerReference::new("app", "service", "api");
            let _owner_guard = OwnerGuard::bind(owner.clone()).unwrap();

            let mut resource = stub_resource("my-resource");
            resource.apply().await.unwrap();
            assert_eq!(resource.owner_references, vec![owner.clone()]);

            // Re-applying with the owner already recorded must not duplicate it.
            resource.apply().await.unwrap();
            assert_eq!(resource.owner_references, vec![owner.clone()]);

            let applied = ctx.applied.lock().unwrap();
            assert_eq!(applied[0].owner_references, vec![owner.clone()]);
            assert_eq!(applied[1].owner_references, vec![owner]);
        }));
    }

    #[test]
    fn test_apply_keeps_explicit_owner_over_ambient_duplicate() {
        tokio_test::block_on(AmbientScope::enter(async {
            let ctx = Arc::new(RecordingContext::ready());
            let _context_guard = ContextGuard::bind(ctx.clone()).unwrap();
            let owner = Resource::<OtherKind>::new(
                "api",
                StubConfig {
                    name: "api".to_string(),
                    size: 10,
                },
            );
            let _owner_guard = OwnerGuard::bind(owner.owner_reference()).unwrap();

            let mut resource = stub_resource("my-resource");
            resource.set_owner(&owner);
            resource.apply().await.unwrap();

            assert_eq!(resource.owner_references, vec![owner.owner_reference()]);
        }));
    }

    #[test]
    fn test_apply_propagates_context_errors_unchanged() {
        struct FailingContext;

        #[async_trait]
        impl RuntimeContext for FailingContext {
            async fn apply_resource(&self, _request: ApplyRequest) -> Result<(), SdkError> {
                Err(SdkError::Context("connection refused".to_string()))
            }

            async fn wait_for_state(
                &self,
                _resource_id: &str,
                _target: LifecycleState,
                _timeout: Duration,
            ) -> Result<StateSnapshot, SdkError> {
                unreachable!("apply test never waits")
            }
        }

        tokio_test::block_on(AmbientScope::enter(async {
            let _guard = ContextGuard::bind(Arc::new(FailingContext)).unwrap();
            let mut resource = stub_resource("my-resource");
            let err = resource.apply().await.unwrap_err();
            assert_eq!(err.to_string(), "connection refused");
            // PENDING was set before the context rejected the payload.
            assert_eq!(resource.lifecycle_state, LifecycleState::Pending);
        }));
    }

    #[test]
    fn test_wait_ready_updates_state_and_outputs() {
        tokio_test::block_on(AmbientScope::enter(async {
            let ctx = Arc::new(RecordingContext::new(StateSnapshot {
                lifecycle_state: LifecycleState::Ready,
                outputs: Some(json!({"url": "https://my-resource.example.com"})),
            }));
            let _guard = ContextGuard::bind(ctx.clone()).unwrap();

            let mut resource = stub_resource("my-resource");
            resource.wait_ready().await.unwrap();

            assert_eq!(resource.lifecycle_state, LifecycleState::Ready);
            assert_eq!(
                resource.outputs,
                Some(StubOutputs {
                    url: "https://my-resource.example.com".to_string()
                })
            );
        }));
    }

    #[test]
    fn test_wait_ready_defaults_to_sixty_seconds() {
        tokio_test::block_on(AmbientScope::enter(async {
            let ctx = Arc::new(RecordingContext::ready());
            let _guard = ContextGuard::bind(ctx.clone()).unwrap();

            let mut resource = stub_resource("my-resource");
            resource.wait_ready().await.unwrap();

            let calls = ctx.wait_calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].0, "resource:test_stub_my-resource");
            assert_eq!(calls[0].1, LifecycleState::Ready);
            assert_eq!(calls[0].2, Duration::from_secs_f64(60.0));
        }));
    }

    #[test]
    fn test_wait_ready_within_passes_explicit_timeout() {
        tokio_test::block_on(AmbientScope::enter(async {
            let ctx = Arc::new(RecordingContext::ready());
            let _guard = ContextGuard::bind(ctx.clone()).unwrap();

            let mut resource = stub_resource("my-resource");
            resource
                .wait_ready_within(Duration::from_secs(5))
                .await
                .unwrap();

            let calls = ctx.wait_calls.lock().unwrap();
            assert_eq!(calls[0].2, Duration::from_secs(5));
        }));
    }

    #[test]
    fn test_wait_ready_propagates_remote_failure_unchanged() {
        struct FailedContext;

        #[async_trait]
        impl RuntimeContext for FailedContext {
            async fn apply_resource(&self, _request: ApplyRequest) -> Result<(), SdkError> {
                Ok(())
            }

            async fn wait_for_state(
                &self,
                resource_id: &str,
                _target: LifecycleState,
                _timeout: Duration,
            ) -> Result<StateSnapshot, SdkError> {
                Err(SdkError::ResourceFailed {
                    resource_id: resource_id.to_string(),
                    detail: "quota exceeded".to_string(),
                })
            }
        }

        tokio_test::block_on(AmbientScope::enter(async {
            let _guard = ContextGuard::bind(Arc::new(FailedContext)).unwrap();
            let mut resource = stub_resource("my-resource");
            let err = resource.wait_ready().await.unwrap_err();
            let message = err.to_string();
            assert!(message.contains("resource:test_stub_my-resource"));
            assert!(message.contains("quota exceeded"));
            // Local state is untouched on failure.
            assert_eq!(resource.lifecycle_state, LifecycleState::Draft);
        }));
    }

    #[test]
    fn test_resource_serde_round_trip() {
        let mut resource = stub_resource("my-resource");
        resource.add_owner_reference(OwnerReference::new("app", "service", "api"));
        resource.lifecycle_state = LifecycleState::Pending;

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["lifecycle_state"], json!("pending"));

        let decoded: Resource<StubKind> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.name, resource.name);
        assert_eq!(decoded.config, resource.config);
        assert_eq!(decoded.owner_references, resource.owner_references);
        assert_eq!(decoded.lifecycle_state, LifecycleState::Pending);
    }
}
