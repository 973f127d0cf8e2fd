//! Scaling-Lifecycle Reconciler
//!
//! Admits launching proxy nodes into the published fleet once they pass
//! the health gate, and removes terminating nodes before they go away.
//! Fleet record sets are always recomputed from the full membership.

use crate::application::dns_publisher::{DnsPublisher, PublishReport};
use crate::domain::entities::{LifecycleAck, ProxyNode};
use crate::domain::events::LifecycleEvent;
use crate::domain::ports::ScalingGroup;
use crate::domain::services::{Membership, MembershipOverride};
use crate::domain::value_objects::{LifecycleActionResult, LifecycleTransition, NodePhase};
use crate::error::Result;
use crate::infrastructure::{Deadline, HealthChecker};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Part of a terminate invocation kept back for completing the hook.
pub const ACK_GRACE: Duration = Duration::from_secs(2);

/// Result of handling one lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Ignored(String),
    Admitted {
        instance_id: String,
        report: PublishReport,
    },
    Evicted {
        instance_id: String,
        report: PublishReport,
    },
}

pub struct ScalingLifecycleReconciler {
    group: String,
    scaling_group: Arc<dyn ScalingGroup>,
    health: HealthChecker,
    publisher: DnsPublisher,
}

impl ScalingLifecycleReconciler {
    pub fn new(
        group: String,
        scaling_group: Arc<dyn ScalingGroup>,
        health: HealthChecker,
        publisher: DnsPublisher,
    ) -> Self {
        Self {
            group,
            scaling_group,
            health,
            publisher,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub async fn handle(&self, event: &LifecycleEvent, deadline: Deadline) -> Result<LifecycleOutcome> {
        if event.group_name != self.group {
            tracing::debug!(group = %event.group_name, "ignoring event from another scaling group");
            return Ok(LifecycleOutcome::Ignored(format!(
                "event for group {}",
                event.group_name
            )));
        }

        let Some(instance_id) = event.instance_id.as_deref() else {
            tracing::info!(transition = %event.transition, "event carries no instance id, ignoring");
            return Ok(LifecycleOutcome::Ignored("no instance id".to_string()));
        };

        match event.transition() {
            LifecycleTransition::Launching => self.admit(event, instance_id, deadline).await,
            LifecycleTransition::Terminating => self.evict(event, instance_id, deadline).await,
            LifecycleTransition::Unknown(transition) => {
                tracing::warn!(
                    node = %instance_id,
                    transition = %transition,
                    "unknown lifecycle transition, acknowledging without changes"
                );
                self.complete(event, instance_id, deadline).await?;
                Ok(LifecycleOutcome::Ignored(format!("transition {}", transition)))
            }
        }
    }

    /// Health-gate a launching node, then publish the fleet including it.
    async fn admit(&self, event: &LifecycleEvent, instance_id: &str, deadline: Deadline) -> Result<LifecycleOutcome> {
        tracing::info!(node = %instance_id, phase = ?NodePhase::Pending, "node launching");

        let node = deadline
            .run("describing instance", self.scaling_group.describe_instance(instance_id))
            .await??;

        // Retried notifications can arrive after the instance lost its address.
        let Some((node, private)) = node.and_then(|n| n.private_address.map(|ip| (n, ip))) else {
            tracing::info!(node = %instance_id, "instance has no private address, ignoring");
            return Ok(LifecycleOutcome::Ignored(format!(
                "instance {} has no private address",
                instance_id
            )));
        };

        tracing::info!(node = %instance_id, phase = ?NodePhase::HealthChecking, address = %private, "health checking node");

        let ack = ack_for(event, instance_id);
        let scaling_group = self.scaling_group.clone();
        let heartbeat_ack = ack.clone();
        let status = deadline
            .run(
                "waiting for node to become healthy",
                self.health.wait_until_healthy(IpAddr::V4(private), move || {
                    let scaling_group = scaling_group.clone();
                    let ack = heartbeat_ack.clone();
                    async move {
                        match scaling_group.record_lifecycle_heartbeat(&ack).await {
                            Ok(()) => tracing::debug!(node = %ack.instance_id, "lifecycle heartbeat recorded"),
                            Err(e) => tracing::warn!(node = %ack.instance_id, "failed to record heartbeat: {}", e),
                        }
                    }
                }),
            )
            .await?;

        tracing::debug!(node = %instance_id, polls = status.polls, heartbeats = status.heartbeats, "health gate passed");

        // Acknowledge first so concurrent handlers see the node as admitted.
        deadline
            .run(
                "completing lifecycle action",
                self.scaling_group.complete_lifecycle_action(&ack),
            )
            .await??;

        let report = self
            .publish_with(deadline, MembershipOverride::Include(&node))
            .await?;

        tracing::info!(node = %instance_id, phase = ?NodePhase::Registered, "node admitted");
        Ok(LifecycleOutcome::Admitted {
            instance_id: instance_id.to_string(),
            report,
        })
    }

    /// Publish the fleet without a terminating node, then release it.
    ///
    /// The hook is completed even when publishing fails or hangs so
    /// termination is never blocked; the publishing error is still
    /// returned. Publishing stops `ACK_GRACE` before the deadline.
    async fn evict(&self, event: &LifecycleEvent, instance_id: &str, deadline: Deadline) -> Result<LifecycleOutcome> {
        tracing::info!(node = %instance_id, phase = ?NodePhase::Draining, "node terminating");

        let published = self
            .publish_with(deadline.reserve(ACK_GRACE), MembershipOverride::Exclude(instance_id))
            .await;
        if let Err(e) = &published {
            tracing::error!(node = %instance_id, "failed to publish fleet without node: {}", e);
        }

        self.complete(event, instance_id, deadline).await?;
        let report = published?;

        tracing::info!(node = %instance_id, phase = ?NodePhase::Removed, "node removed");
        Ok(LifecycleOutcome::Evicted {
            instance_id: instance_id.to_string(),
            report,
        })
    }

    /// Publish the fleet as the scaling group currently reports it.
    pub async fn resync(&self, deadline: Deadline) -> Result<PublishReport> {
        let report = self.publish_with(deadline, MembershipOverride::None).await?;
        tracing::info!(
            published = report.published.len(),
            skipped = report.skipped.len(),
            "fleet records resynchronised"
        );
        Ok(report)
    }

    async fn publish_with(&self, deadline: Deadline, adjust: MembershipOverride<'_>) -> Result<PublishReport> {
        let members: Vec<ProxyNode> = deadline
            .run("listing proxy nodes", self.scaling_group.describe_members(&self.group))
            .await??;

        let fleet = Membership::fleet_addresses(&members, adjust);
        deadline
            .run("publishing fleet records", self.publisher.publish(&fleet))
            .await?
    }

    async fn complete(&self, event: &LifecycleEvent, instance_id: &str, deadline: Deadline) -> Result<()> {
        let ack = ack_for(event, instance_id);
        deadline
            .run(
                "completing lifecycle action",
                self.scaling_group.complete_lifecycle_action(&ack),
            )
            .await?
    }
}

fn ack_for(event: &LifecycleEvent, instance_id: &str) -> LifecycleAck {
    LifecycleAck {
        group_name: event.group_name.clone(),
        hook_name: event.hook_name.clone(),
        action_token: event.action_token.clone(),
        instance_id: instance_id.to_string(),
        result: LifecycleActionResult::Continue,
    }
}
