//! Cluster-Change Reconciler
//!
//! Reacts to task state changes in the orchestration cluster by telling
//! every in-service proxy node to rebuild its backend directory, then
//! waits for each node to finish.

use crate::domain::entities::RemoteCommand;
use crate::domain::events::TaskStateChange;
use crate::domain::ports::{CommandChannel, ScalingGroup};
use crate::domain::value_objects::{InvocationStatus, LifecycleState};
use crate::infrastructure::Deadline;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Cluster-change reconciler configuration.
#[derive(Debug, Clone)]
pub struct ClusterReconcilerConfig {
    /// Orchestration cluster whose events are handled
    pub cluster: String,
    /// Scaling group of the proxy fleet
    pub group: String,
    /// Delay between completion polls for one node
    pub poll_interval: Duration,
    /// Maximum number of nodes polled concurrently
    pub fanout_limit: usize,
}

impl Default for ClusterReconcilerConfig {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            group: String::new(),
            poll_interval: Duration::from_secs(1),
            fanout_limit: 8,
        }
    }
}

/// How the rebuild ended on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Finished(InvocationStatus),
    Failed(String),
    DeadlineExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCommandResult {
    pub node_id: String,
    pub outcome: NodeOutcome,
}

/// Per-node results of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Absent when there was no node to command
    pub job_id: Option<String>,
    pub nodes: Vec<NodeCommandResult>,
}

impl FanOutReport {
    pub fn all_succeeded(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.outcome == NodeOutcome::Finished(InvocationStatus::Success))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOutcome {
    Ignored(String),
    FannedOut(FanOutReport),
}

pub struct ClusterChangeReconciler {
    config: ClusterReconcilerConfig,
    scaling_group: Arc<dyn ScalingGroup>,
    commands: Arc<dyn CommandChannel>,
}

impl ClusterChangeReconciler {
    pub fn new(
        config: ClusterReconcilerConfig,
        scaling_group: Arc<dyn ScalingGroup>,
        commands: Arc<dyn CommandChannel>,
    ) -> Self {
        Self {
            config,
            scaling_group,
            commands,
        }
    }

    pub fn config(&self) -> &ClusterReconcilerConfig {
        &self.config
    }

    /// Fan a rebuild out to every in-service proxy node.
    ///
    /// Errors only when the fleet cannot be listed or the command cannot be
    /// sent. Per-node failures are reported in the returned report.
    pub async fn handle(
        &self,
        event: &TaskStateChange,
        deadline: Deadline,
    ) -> crate::error::Result<ClusterOutcome> {
        if !cluster_matches(&self.config.cluster, &event.cluster) {
            tracing::debug!(cluster = %event.cluster, "ignoring event from another cluster");
            return Ok(ClusterOutcome::Ignored(format!(
                "event for cluster {}",
                event.cluster
            )));
        }

        tracing::info!(
            cluster = %event.cluster,
            task = ?event.task_id,
            last_status = ?event.last_status,
            desired_status = ?event.desired_status,
            "task state changed"
        );

        let members = deadline
            .run(
                "listing proxy nodes",
                self.scaling_group.describe_members(&self.config.group),
            )
            .await??;

        let node_ids: Vec<String> = members
            .into_iter()
            .filter(|m| m.lifecycle_state == LifecycleState::InService)
            .map(|m| m.instance_id)
            .collect();

        if node_ids.is_empty() {
            tracing::info!(group = %self.config.group, "no in-service proxy nodes to rebuild");
            return Ok(ClusterOutcome::FannedOut(FanOutReport::default()));
        }

        let job_id = deadline
            .run(
                "sending rebuild command",
                self.commands.send_command(&node_ids, RemoteCommand::Rebuild),
            )
            .await??;

        tracing::info!(job = %job_id, nodes = node_ids.len(), "rebuild command sent");

        let mut nodes: Vec<NodeCommandResult> = stream::iter(node_ids)
            .map(|node_id| self.await_completion(&job_id, node_id, deadline))
            .buffer_unordered(self.config.fanout_limit.max(1))
            .collect()
            .await;
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        let report = FanOutReport {
            job_id: Some(job_id),
            nodes,
        };
        if !report.all_succeeded() {
            tracing::warn!(job = ?report.job_id, "rebuild did not succeed on every node");
        }

        Ok(ClusterOutcome::FannedOut(report))
    }

    /// Poll one node until its invocation reaches a terminal status.
    async fn await_completion(&self, job_id: &str, node_id: String, deadline: Deadline) -> NodeCommandResult {
        let poll = async {
            loop {
                tokio::time::sleep(self.config.poll_interval).await;

                match self.commands.get_invocation(job_id, &node_id).await {
                    Ok(status) if status.is_terminal() => return NodeOutcome::Finished(status),
                    Ok(status) => {
                        tracing::debug!(job = %job_id, node = %node_id, ?status, "rebuild still running");
                    }
                    Err(e) if e.is_transient() => {
                        tracing::debug!(job = %job_id, node = %node_id, "{}", e);
                    }
                    Err(e) => return NodeOutcome::Failed(e.to_string()),
                }
            }
        };

        let outcome = deadline
            .run("waiting for rebuild", poll)
            .await
            .unwrap_or(NodeOutcome::DeadlineExceeded);

        match &outcome {
            NodeOutcome::Finished(InvocationStatus::Success) => {
                tracing::info!(job = %job_id, node = %node_id, "rebuild finished");
            }
            other => {
                tracing::warn!(job = %job_id, node = %node_id, outcome = ?other, "rebuild did not succeed");
            }
        }

        NodeCommandResult { node_id, outcome }
    }
}

/// Events may carry a cluster name or a full resource identifier ending in it.
fn cluster_matches(configured: &str, reported: &str) -> bool {
    configured == reported
        || reported
            .rsplit_once('/')
            .map_or(false, |(_, name)| name == configured)
}
