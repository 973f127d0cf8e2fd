//! Scaling Group Port
//!
//! Membership and lifecycle-hook acknowledgement for the proxy fleet.

use crate::domain::entities::{LifecycleAck, ProxyNode};
use crate::error::Result;
use async_trait::async_trait;

/// The elastic group the proxy nodes belong to.
///
/// Membership is always queried live; nothing here is cached between
/// invocations.
#[async_trait]
pub trait ScalingGroup: Send + Sync {
    /// Current members of the group with their lifecycle state.
    async fn describe_members(&self, group: &str) -> Result<Vec<ProxyNode>>;

    /// Look up a single instance. `Ok(None)` if it is unknown.
    async fn describe_instance(&self, instance_id: &str) -> Result<Option<ProxyNode>>;

    /// Complete a paused lifecycle hook.
    async fn complete_lifecycle_action(&self, ack: &LifecycleAck) -> Result<()>;

    /// Extend a paused lifecycle hook's timeout.
    async fn record_lifecycle_heartbeat(&self, ack: &LifecycleAck) -> Result<()>;
}
