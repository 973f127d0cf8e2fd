//! Command Channel Port
//!
//! Remote execution of named commands on proxy nodes.

use crate::domain::entities::RemoteCommand;
use crate::domain::value_objects::InvocationStatus;
use crate::error::Result;
use async_trait::async_trait;

/// Submits commands to a set of nodes and reports per-node completion.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Submit a command to every node in `node_ids`. Returns the job id.
    async fn send_command(&self, node_ids: &[String], command: RemoteCommand) -> Result<String>;

    /// Status of a job on one node.
    ///
    /// Fails with `NlbError::CommandNotYetVisible` while the node has not
    /// registered the job yet; callers retry that case.
    async fn get_invocation(&self, job_id: &str, node_id: &str) -> Result<InvocationStatus>;
}
