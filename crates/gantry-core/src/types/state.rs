//! Lifecycle state machine and resource identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource lifecycle states.
///
/// `Draft` is the only legal initial state for a freshly constructed
/// resource. `Pending` is set locally once `apply()` is accepted by the
/// runtime context, before the remote system confirms. `Processing` is set
/// by a dispatch harness right before a handler runs. `Ready` and `Failed`
/// are terminal per apply cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Draft,
    Pending,
    Processing,
    Ready,
    Failed,
}

impl LifecycleState {
    /// Check if the state is terminal for an apply cycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::Failed)
    }

    /// Wire representation of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "draft",
            LifecycleState::Pending => "pending",
            LifecycleState::Processing => "processing",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format the unique resource ID: `resource:{provider}_{resource}_{name}`.
///
/// This composite id is the sole identity key across the system; two
/// references with identical triples denote the same logical resource.
pub fn format_resource_id(provider: &str, resource: &str, name: &str) -> String {
    format!("resource:{}_{}_{}", provider, resource, name)
}
