//! Provider registry for resource type descriptors.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use gantry_core::context::{AmbientScope, ContextGuard, OwnerGuard, RuntimeContext};
use gantry_core::resource::{Resource, ResourceKind};
use gantry_core::types::{LifecycleState, ResourceDefinition, ResponseStatus};

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("resource type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("resource type '{tag}' declares provider '{declared}'; this provider is '{expected}'")]
    ProviderMismatch {
        tag: String,
        declared: String,
        expected: String,
    },

    #[error("resource type '{provider}/{resource}' is registered by more than one provider")]
    Conflict { provider: String, resource: String },
}

/// Outcome of driving one lifecycle handler through a descriptor.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: ResponseStatus,
    pub outputs: Option<Value>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    fn success(outputs: Option<Value>) -> Self {
        Self {
            status: ResponseStatus::Success,
            outputs,
            error: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failure,
            outputs: None,
            error: Some(message.into()),
        }
    }

    /// Whether the handler completed without error.
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Type-erased lifecycle dispatch for one registered resource type.
#[async_trait]
trait ErasedDispatch: Send + Sync {
    async fn create(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
    ) -> DispatchOutcome;

    async fn update(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
        previous_config: Value,
        current_outputs: Option<Value>,
    ) -> DispatchOutcome;

    async fn delete(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
    ) -> DispatchOutcome;
}

struct KindDispatch<K>(PhantomData<K>);

impl<K: ResourceKind> KindDispatch<K> {
    fn decode_config(config: Value) -> Result<K::Config, DispatchOutcome> {
        serde_json::from_value(config).map_err(|e| {
            DispatchOutcome::failure(format!("invalid config for '{}': {}", K::RESOURCE, e))
        })
    }
}

#[async_trait]
impl<K: ResourceKind> ErasedDispatch for KindDispatch<K> {
    async fn create(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
    ) -> DispatchOutcome {
        let config = match Self::decode_config(config) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };
        let mut resource = Resource::<K>::new(name, config);
        resource.lifecycle_state = LifecycleState::Processing;
        let owner = resource.owner_reference();

        AmbientScope::enter(async {
            let _context_guard = match ContextGuard::bind(ctx) {
                Ok(guard) => guard,
                Err(e) => return DispatchOutcome::failure(e.to_string()),
            };
            let _owner_guard = match OwnerGuard::bind(owner) {
                Ok(guard) => guard,
                Err(e) => return DispatchOutcome::failure(e.to_string()),
            };
            match K::on_create(&mut resource).await {
                Ok(outputs) => match serde_json::to_value(&outputs) {
                    Ok(value) => DispatchOutcome::success(Some(value)),
                    Err(e) => DispatchOutcome::failure(format!("invalid outputs: {}", e)),
                },
                Err(e) => DispatchOutcome::failure(e.to_string()),
            }
        })
        .await
    }

    async fn update(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
        previous_config: Value,
        current_outputs: Option<Value>,
    ) -> DispatchOutcome {
        let config = match Self::decode_config(config) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };
        let previous_config = match Self::decode_config(previous_config) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };
        let current_outputs: Option<K::Outputs> = match current_outputs {
            Some(payload) => match serde_json::from_value(payload) {
                Ok(outputs) => Some(outputs),
                Err(e) => {
                    return DispatchOutcome::failure(format!(
                        "invalid current outputs for '{}': {}",
                        K::RESOURCE,
                        e
                    ))
                }
            },
            None => None,
        };

        let mut resource = Resource::<K>::new(name, config);
        resource.outputs = current_outputs;
        resource.lifecycle_state = LifecycleState::Processing;
        let owner = resource.owner_reference();

        AmbientScope::enter(async {
            let _context_guard = match ContextGuard::bind(ctx) {
                Ok(guard) => guard,
                Err(e) => return DispatchOutcome::failure(e.to_string()),
            };
            let _owner_guard = match OwnerGuard::bind(owner) {
                Ok(guard) => guard,
                Err(e) => return DispatchOutcome::failure(e.to_string()),
            };
            match K::on_update(&mut resource, &previous_config).await {
                Ok(outputs) => match serde_json::to_value(&outputs) {
                    Ok(value) => DispatchOutcome::success(Some(value)),
                    Err(e) => DispatchOutcome::failure(format!("invalid outputs: {}", e)),
                },
                Err(e) => DispatchOutcome::failure(e.to_string()),
            }
        })
        .await
    }

    async fn delete(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
    ) -> DispatchOutcome {
        let config = match Self::decode_config(config) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };
        let mut resource = Resource::<K>::new(name, config);
        resource.lifecycle_state = LifecycleState::Processing;
        let owner = resource.owner_reference();

        AmbientScope::enter(async {
            let _context_guard = match ContextGuard::bind(ctx) {
                Ok(guard) => guard,
                Err(e) => return DispatchOutcome::failure(e.to_string()),
            };
            let _owner_guard = match OwnerGuard::bind(owner) {
                Ok(guard) => guard,
                Err(e) => return DispatchOutcome::failure(e.to_string()),
            };
            match K::on_delete(&mut resource).await {
                Ok(()) => DispatchOutcome::success(None),
                Err(e) => DispatchOutcome::failure(e.to_string()),
            }
        })
        .await
    }
}

/// Immutable descriptor pairing a resource type tag with its dispatch.
///
/// Constructed by [`Provider::register`]; nothing is ever stamped onto the
/// resource type itself.
pub struct ResourceDescriptor {
    provider: String,
    resource: String,
    dispatch: Arc<dyn ErasedDispatch>,
}

impl ResourceDescriptor {
    fn of<K: ResourceKind>() -> Self {
        Self {
            provider: K::PROVIDER.to_string(),
            resource: K::RESOURCE.to_string(),
            dispatch: Arc::new(KindDispatch::<K>(PhantomData)),
        }
    }

    /// Provider name the descriptor belongs to.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Resource type tag.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Definition metadata for this resource type.
    pub fn definition(&self) -> ResourceDefinition {
        ResourceDefinition::new(self.provider.clone(), self.resource.clone())
    }

    /// Drive `on_create` for a decoded payload.
    pub async fn dispatch_create(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
    ) -> DispatchOutcome {
        self.dispatch.create(ctx, name, config).await
    }

    /// Drive `on_update` for a decoded payload.
    pub async fn dispatch_update(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
        previous_config: Value,
        current_outputs: Option<Value>,
    ) -> DispatchOutcome {
        self.dispatch
            .update(ctx, name, config, previous_config, current_outputs)
            .await
    }

    /// Drive `on_delete` for a decoded payload.
    pub async fn dispatch_delete(
        &self,
        ctx: Arc<dyn RuntimeContext>,
        name: &str,
        config: Value,
    ) -> DispatchOutcome {
        self.dispatch.delete(ctx, name, config).await
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("provider", &self.provider)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// A named collection of resource types.
///
/// Long-lived, append-only, write-once-per-key: there is no deletion path.
pub struct Provider {
    name: String,
    resources: HashMap<String, Arc<ResourceDescriptor>>,
}

impl Provider {
    /// Create an empty provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: HashMap::new(),
        }
    }

    /// Provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a resource type under its declared tag.
    ///
    /// Rejects a tag that is already taken within this provider, and a kind
    /// whose declared provider differs from this provider's name.
    pub fn register<K: ResourceKind>(&mut self) -> Result<(), RegistryError> {
        if K::PROVIDER != self.name {
            return Err(RegistryError::ProviderMismatch {
                tag: K::RESOURCE.to_string(),
                declared: K::PROVIDER.to_string(),
                expected: self.name.clone(),
            });
        }
        if self.resources.contains_key(K::RESOURCE) {
            return Err(RegistryError::AlreadyRegistered(K::RESOURCE.to_string()));
        }
        tracing::debug!(
            provider = %self.name,
            resource = K::RESOURCE,
            "registered resource type"
        );
        self.resources
            .insert(K::RESOURCE.to_string(), Arc::new(ResourceDescriptor::of::<K>()));
        Ok(())
    }

    /// Descriptor registered under `tag`, if any.
    pub fn get(&self, tag: &str) -> Option<&ResourceDescriptor> {
        self.resources.get(tag).map(Arc::as_ref)
    }

    /// Whether `tag` is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.resources.contains_key(tag)
    }

    /// Number of registered resource types.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the provider has no registered resource types.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Definition metadata for every registered type, sorted by tag.
    pub fn definitions(&self) -> Vec<ResourceDefinition> {
        self.tags()
            .into_iter()
            .filter_map(|tag| self.resources.get(tag))
            .map(|descriptor| descriptor.definition())
            .collect()
    }

    fn descriptors(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.resources.values()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider '{}' [{}]", self.name, self.tags().join(", "))
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("resources", &self.tags())
            .finish()
    }
}

/// Collect every registered resource type across `providers` into a
/// `(provider_name, resource_tag)` map.
///
/// Providers with zero registrations contribute nothing; a `(provider, tag)`
/// pair claimed by more than one provider is an error.
pub fn discover_resources<'a>(
    providers: impl IntoIterator<Item = &'a Provider>,
) -> Result<HashMap<(String, String), Arc<ResourceDescriptor>>, RegistryError> {
    let mut discovered = HashMap::new();
    for provider in providers {
        for descriptor in provider.descriptors() {
            let key = (
                descriptor.provider().to_string(),
                descriptor.resource().to_string(),
            );
            if discovered.insert(key.clone(), Arc::clone(descriptor)).is_some() {
                return Err(RegistryError::Conflict {
                    provider: key.0,
                    resource: key.1,
                });
            }
        }
    }
    Ok(discovered)
}

/// Whether a `(provider, tag)` pair is present in a discovery map.
pub fn is_registered(
    discovered: &HashMap<(String, String), Arc<ResourceDescriptor>>,
    provider: &str,
    tag: &str,
) -> bool {
    discovered.contains_key(&(provider.to_string(), tag.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HarnessRuntimeContext;
    use async_trait::async_trait;
    use gantry_core::resource::HandlerError;
    use gantry_core::types::{Config, Outputs};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct StubConfig {
        value: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct StubOutputs {
        result: String,
    }

    impl Config for StubConfig {}
    impl Outputs for StubOutputs {}

    macro_rules! stub_kind {
        ($kind:ident, $provider:expr, $tag:expr) => {
            struct $kind;

            #[async_trait]
            impl ResourceKind for $kind {
                const PROVIDER: &'static str = $provider;
                const RESOURCE: &'static str = $tag;
                type Config = StubConfig;
                type Outputs = StubOutputs;

                async fn on_create(
                    _resource: &mut Resource<Self>,
                ) -> Result<StubOutputs, HandlerError> {
                    Ok(StubOutputs {
                        result: "created".to_string(),
                    })
                }

                async fn on_update(
                    _resource: &mut Resource<Self>,
                    _previous_config: &StubConfig,
                ) -> Result<StubOutputs, HandlerError> {
                    Ok(StubOutputs {
                        result: "updated".to_string(),
                    })
                }

                async fn on_delete(_resource: &mut Resource<Self>) -> Result<(), HandlerError> {
                    Ok(())
                }
            }
        };
    }

    stub_kind!(FirstKind, "collector", "first");
    stub_kind!(SecondKind, "collector", "second");
    stub_kind!(ForeignKind, "elsewhere", "first");

    #[test]
    fn test_register_collects_resources_under_their_tags() {
        let mut provider = Provider::new("collector");
        provider.register::<FirstKind>().unwrap();
        provider.register::<SecondKind>().unwrap();

        assert_eq!(provider.len(), 2);
        assert!(provider.contains("first"));
        assert!(provider.contains("second"));
        assert_eq!(provider.get("first").unwrap().resource(), "first");
        assert_eq!(provider.tags(), vec!["first", "second"]);
    }

    #[test]
    fn test_register_rejects_duplicate_tags() {
        stub_kind!(DuplicateKind, "collector", "first");

        let mut provider = Provider::new("collector");
        provider.register::<FirstKind>().unwrap();
        let err = provider.register::<DuplicateKind>().unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn test_register_rejects_provider_mismatch() {
        let mut provider = Provider::new("collector");
        let err = provider.register::<ForeignKind>().unwrap_err();
        assert!(matches!(err, RegistryError::ProviderMismatch { .. }));
        assert!(err.to_string().contains("elsewhere"));
        assert!(provider.is_empty());
    }

    #[test]
    fn test_display_shows_name_and_tags() {
        let mut provider = Provider::new("collector");
        provider.register::<FirstKind>().unwrap();
        let rendered = provider.to_string();
        assert!(rendered.contains("collector"));
        assert!(rendered.contains("first"));
    }

    #[test]
    fn test_definitions_export_sorted_metadata() {
        let mut provider = Provider::new("collector");
        provider.register::<SecondKind>().unwrap();
        provider.register::<FirstKind>().unwrap();

        let definitions = provider.definitions();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].id(), "resource_definition:collector_first");
        assert_eq!(definitions[1].id(), "resource_definition:collector_second");
    }

    #[test]
    fn test_discover_resources_collects_across_providers() {
        let mut collector = Provider::new("collector");
        collector.register::<FirstKind>().unwrap();
        collector.register::<SecondKind>().unwrap();
        let mut foreign = Provider::new("elsewhere");
        foreign.register::<ForeignKind>().unwrap();

        let discovered = discover_resources([&collector, &foreign]).unwrap();
        assert_eq!(discovered.len(), 3);
        assert!(is_registered(&discovered, "collector", "first"));
        assert!(is_registered(&discovered, "collector", "second"));
        assert!(is_registered(&discovered, "elsewhere", "first"));
        assert!(!is_registered(&discovered, "collector", "missing"));
    }

    #[test]
    fn test_discover_resources_empty_input_yields_empty_map() {
        let empty = Provider::new("empty");
        let discovered = discover_resources([&empty]).unwrap();
        assert!(discovered.is_empty());

        let discovered = discover_resources(std::iter::empty::<&Provider>()).unwrap();
        assert!(discovered.is_empty());
    }

    #[test]
    fn test_discover_resources_fails_on_conflicting_pairs() {
        let mut a = Provider::new("collector");
        a.register::<FirstKind>().unwrap();
        let mut b = Provider::new("collector");
        b.register::<FirstKind>().unwrap();

        let err = discover_resources([&a, &b]).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[test]
    fn test_dispatch_create_drives_handler_and_reports_outputs() {
        tokio_test::block_on(async {
            let mut provider = Provider::new("collector");
            provider.register::<FirstKind>().unwrap();
            let ctx = HarnessRuntimeContext::shared();

            let outcome = provider
                .get("first")
                .unwrap()
                .dispatch_create(ctx, "r1", json!({"value": "x"}))
                .await;

            assert!(outcome.is_success());
            assert_eq!(outcome.outputs, Some(json!({"result": "created"})));
        });
    }

    #[test]
    fn test_dispatch_create_rejects_undeclared_config_fields() {
        tokio_test::block_on(async {
            let mut provider = Provider::new("collector");
            provider.register::<FirstKind>().unwrap();
            let ctx = HarnessRuntimeContext::shared();

            let outcome = provider
                .get("first")
                .unwrap()
                .dispatch_create(ctx, "r1", json!({"value": "x", "unknown_field": "bad"}))
                .await;

            assert!(!outcome.is_success());
            assert!(outcome.error.unwrap().contains("invalid config"));
        });
    }
}
