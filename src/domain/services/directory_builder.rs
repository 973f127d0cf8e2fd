//! Directory Builder Service
//!
//! Pure domain logic turning task placement into backend endpoints.
//! This service has NO external dependencies - it's pure Rust.

use crate::domain::entities::{BackendDirectory, BackendEndpoint, ServiceListener, Task};
use std::collections::HashMap;
use std::net::IpAddr;

/// Resolves running tasks of one listener into endpoints.
pub struct DirectoryBuilder;

impl DirectoryBuilder {
    /// Add the endpoints of `tasks` to `directory` under `listener`.
    ///
    /// # Arguments
    /// * `directory` - Directory being assembled
    /// * `listener` - Listener the tasks' service was tagged with
    /// * `tasks` - Tasks of that service, in any state
    /// * `node_addresses` - Cluster node id -> host address
    ///
    /// # Returns
    /// Number of running tasks that were dropped because their host could
    /// not be resolved.
    pub fn collect_endpoints(
        directory: &mut BackendDirectory,
        listener: ServiceListener,
        tasks: &[Task],
        node_addresses: &HashMap<String, IpAddr>,
    ) -> usize {
        let mut dropped = 0;

        for task in tasks.iter().filter(|t| t.is_running()) {
            let address = task
                .node_id
                .as_ref()
                .and_then(|node| node_addresses.get(node));

            let Some(address) = address else {
                tracing::warn!(
                    listener = %listener,
                    task = %task.task_id,
                    node = ?task.node_id,
                    "task host not resolvable, dropping endpoint"
                );
                dropped += 1;
                continue;
            };

            for host_port in task.host_ports_for(&listener) {
                directory.insert(listener, BackendEndpoint::new(*address, host_port));
            }
        }

        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Container, NetworkBinding};
    use crate::domain::value_objects::Protocol;

    fn task(id: &str, node: Option<&str>, status: &str, container_port: u16, host_port: u16) -> Task {
        Task {
            task_id: id.to_string(),
            node_id: node.map(|n| n.to_string()),
            last_status: status.to_string(),
            desired_status: "RUNNING".to_string(),
            containers: vec![Container {
                name: "app".to_string(),
                network_bindings: vec![NetworkBinding {
                    container_port,
                    host_port,
                    protocol: None,
                }],
            }],
        }
    }

    fn nodes() -> HashMap<String, IpAddr> {
        let mut map = HashMap::new();
        map.insert("ci-1".to_string(), "10.0.0.1".parse().unwrap());
        map.insert("ci-2".to_string(), "10.0.0.2".parse().unwrap());
        map
    }

    #[test]
    fn test_collect_running_tasks() {
        let listener = ServiceListener::new(Protocol::Tcp, 3978);
        let tasks = vec![
            task("t-1", Some("ci-1"), "RUNNING", 3978, 32001),
            task("t-2", Some("ci-2"), "RUNNING", 3978, 32002),
        ];

        let mut directory = BackendDirectory::new();
        let dropped = DirectoryBuilder::collect_endpoints(&mut directory, listener, &tasks, &nodes());

        assert_eq!(dropped, 0);
        let endpoints: Vec<String> = directory
            .endpoints(&listener)
            .unwrap()
            .iter()
            .map(|e| e.socket_addr().to_string())
            .collect();
        assert_eq!(endpoints, vec!["10.0.0.1:32001", "10.0.0.2:32002"]);
    }

    #[test]
    fn test_skips_non_running_tasks() {
        let listener = ServiceListener::new(Protocol::Tcp, 3978);
        let tasks = vec![task("t-1", Some("ci-1"), "PENDING", 3978, 32001)];

        let mut directory = BackendDirectory::new();
        let dropped = DirectoryBuilder::collect_endpoints(&mut directory, listener, &tasks, &nodes());

        assert_eq!(dropped, 0);
        assert!(directory.is_empty());
    }

    #[test]
    fn test_drops_unresolvable_host() {
        let listener = ServiceListener::new(Protocol::Udp, 4978);
        let tasks = vec![
            task("t-1", Some("ci-9"), "RUNNING", 4978, 32001),
            task("t-2", None, "RUNNING", 4978, 32002),
            task("t-3", Some("ci-1"), "RUNNING", 4978, 32003),
        ];

        let mut directory = BackendDirectory::new();
        let dropped = DirectoryBuilder::collect_endpoints(&mut directory, listener, &tasks, &nodes());

        assert_eq!(dropped, 2);
        assert_eq!(directory.endpoint_count(), 1);
    }

    #[test]
    fn test_ignores_bindings_for_other_ports() {
        let listener = ServiceListener::new(Protocol::Tcp, 3978);
        let tasks = vec![task("t-1", Some("ci-1"), "RUNNING", 80, 32001)];

        let mut directory = BackendDirectory::new();
        DirectoryBuilder::collect_endpoints(&mut directory, listener, &tasks, &nodes());

        assert!(directory.is_empty());
    }
}
