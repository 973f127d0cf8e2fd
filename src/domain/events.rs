//! Trigger payloads delivered to the reconcilers.

use crate::domain::value_objects::LifecycleTransition;
use serde::{Deserialize, Serialize};

/// Notification that a task in the orchestration cluster changed state.
///
/// Only the cluster identity matters to the reconciler; the rest is
/// carried for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStateChange {
    pub cluster: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub desired_status: Option<String>,
}

/// Lifecycle hook notification emitted by the scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(rename = "AutoScalingGroupName")]
    pub group_name: String,
    #[serde(rename = "LifecycleHookName", default)]
    pub hook_name: String,
    #[serde(rename = "LifecycleActionToken", default)]
    pub action_token: String,
    #[serde(rename = "LifecycleTransition")]
    pub transition: String,
    /// Absent on test notifications
    #[serde(rename = "EC2InstanceId", default)]
    pub instance_id: Option<String>,
}

impl LifecycleEvent {
    pub fn transition(&self) -> LifecycleTransition {
        LifecycleTransition::parse(&self.transition)
    }
}
