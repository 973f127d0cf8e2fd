//! Cluster Query Port
//!
//! Read-only view of the container-orchestration cluster.

use crate::domain::entities::{ClusterNode, Task};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

/// Queries against the orchestration cluster.
///
/// This is an outbound port. The backend directory builder walks it to
/// find every running, tag-annotated task and the host it runs on.
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// List the hosts registered with the cluster.
    async fn list_cluster_nodes(&self, cluster: &str) -> Result<Vec<ClusterNode>>;

    /// Resolve the private address of the instance backing a cluster node.
    ///
    /// Returns `Ok(None)` when the instance exists but has no address.
    async fn resolve_node_address(&self, instance_id: &str) -> Result<Option<IpAddr>>;

    /// List the services deployed to the cluster.
    async fn list_services(&self, cluster: &str) -> Result<Vec<String>>;

    /// Read a service's tags.
    async fn service_tags(&self, service: &str) -> Result<HashMap<String, String>>;

    /// List and describe the tasks of a service.
    async fn list_tasks(&self, cluster: &str, service: &str) -> Result<Vec<Task>>;
}
