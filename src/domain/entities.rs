//! Domain Entities - Core business objects
//!
//! These entities represent the listeners, endpoints, proxy nodes and
//! record sets the control plane reasons about. They carry no I/O.

use crate::domain::value_objects::{FleetRecord, LifecycleActionResult, LifecycleState, Protocol, RecordType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Service tag carrying the listener protocol.
pub const TAG_PROTOCOL: &str = "NLB-protocol";
/// Service tag carrying the listener port.
pub const TAG_PORT: &str = "NLB-port";
/// Service tag carrying the per-service alias subdomain.
pub const TAG_SUBDOMAIN: &str = "NLB-subdomain";

/// A (protocol, port) pair identifying one proxy upstream group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceListener {
    pub protocol: Protocol,
    pub port: u16,
}

impl ServiceListener {
    pub fn new(protocol: Protocol, port: u16) -> Self {
        Self { protocol, port }
    }

    /// Read the listener from a service's tags.
    ///
    /// Returns None unless both the protocol and port tags are present
    /// and parse.
    pub fn from_tags(tags: &HashMap<String, String>) -> Option<Self> {
        let protocol = Protocol::parse(tags.get(TAG_PROTOCOL)?)?;
        let port = tags.get(TAG_PORT)?.trim().parse::<u16>().ok()?;
        if port == 0 {
            return None;
        }
        Some(Self { protocol, port })
    }

    /// Name of the upstream group in the rendered configuration.
    pub fn upstream_name(&self) -> String {
        format!("{}{}", self.protocol, self.port)
    }
}

impl fmt::Display for ServiceListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.port)
    }
}

/// A concrete address a listener forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendEndpoint {
    pub host_address: IpAddr,
    pub host_port: u16,
}

impl BackendEndpoint {
    pub fn new(host_address: IpAddr, host_port: u16) -> Self {
        Self {
            host_address,
            host_port,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host_address, self.host_port)
    }
}

/// Mapping from listener to its current endpoints.
///
/// Backed by ordered collections so iteration order, and therefore the
/// rendered configuration, only depends on content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendDirectory {
    listeners: BTreeMap<ServiceListener, BTreeSet<BackendEndpoint>>,
}

impl BackendDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an endpoint for a listener. Duplicates collapse.
    pub fn insert(&mut self, listener: ServiceListener, endpoint: BackendEndpoint) {
        self.listeners.entry(listener).or_default().insert(endpoint);
    }

    pub fn endpoints(&self, listener: &ServiceListener) -> Option<&BTreeSet<BackendEndpoint>> {
        self.listeners.get(listener)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServiceListener, &BTreeSet<BackendEndpoint>)> {
        self.listeners.iter()
    }

    /// Number of listeners with at least one endpoint.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn endpoint_count(&self) -> usize {
        self.listeners.values().map(|e| e.len()).sum()
    }
}

/// A host registered with the orchestration cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    /// Cluster-side identity tasks refer to
    pub node_id: String,
    /// Compute instance backing this node
    pub instance_id: String,
    /// Registration status (ACTIVE, DRAINING, INACTIVE)
    pub status: String,
}

impl ClusterNode {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("ACTIVE")
    }
}

/// A port mapping from a container to its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkBinding {
    pub container_port: u16,
    pub host_port: u16,
    #[serde(default)]
    pub protocol: Option<Protocol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub network_bindings: Vec<NetworkBinding>,
}

/// A task (group of containers) scheduled by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    /// Cluster node hosting this task, if placed
    #[serde(default)]
    pub node_id: Option<String>,
    pub last_status: String,
    pub desired_status: String,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Task {
    /// Only tasks that are running and meant to stay running take traffic.
    pub fn is_running(&self) -> bool {
        self.last_status.eq_ignore_ascii_case("RUNNING")
            && self.desired_status.eq_ignore_ascii_case("RUNNING")
    }

    /// Host ports bound to `listener.port` across all containers.
    pub fn host_ports_for(&self, listener: &ServiceListener) -> Vec<u16> {
        self.containers
            .iter()
            .flat_map(|c| c.network_bindings.iter())
            .filter(|b| b.container_port == listener.port)
            .filter(|b| b.protocol.map_or(true, |p| p == listener.protocol))
            .map(|b| b.host_port)
            .collect()
    }
}

/// One member of the proxy fleet's scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyNode {
    pub instance_id: String,
    #[serde(default)]
    pub private_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub public_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub ipv6_address: Option<Ipv6Addr>,
    pub lifecycle_state: LifecycleState,
    /// Health as reported by the scaling group (Healthy / Unhealthy)
    #[serde(default)]
    pub health_status: Option<String>,
}

/// A named DNS record set. Upserts replace the whole value set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSet {
    pub name: String,
    pub record_type: RecordType,
    pub values: BTreeSet<String>,
    pub ttl: u32,
}

impl DnsRecordSet {
    pub fn new<I, S>(name: impl Into<String>, record_type: RecordType, values: I, ttl: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            name: name.into(),
            record_type,
            values: values.into_iter().map(|v| v.to_string()).collect(),
            ttl,
        }
    }
}

/// Address sets of the admitted fleet, one per published record set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetAddresses {
    pub public_v4: BTreeSet<Ipv4Addr>,
    pub public_v6: BTreeSet<Ipv6Addr>,
    pub private_v4: BTreeSet<Ipv4Addr>,
}

impl FleetAddresses {
    /// Add every address the node has.
    pub fn add_node(&mut self, node: &ProxyNode) {
        if let Some(ip) = node.public_address {
            self.public_v4.insert(ip);
        }
        if let Some(ip) = node.ipv6_address {
            self.public_v6.insert(ip);
        }
        if let Some(ip) = node.private_address {
            self.private_v4.insert(ip);
        }
    }

    /// Rendered record values for one fleet record set.
    pub fn values(&self, record: FleetRecord) -> BTreeSet<String> {
        match record {
            FleetRecord::PublicV4 => self.public_v4.iter().map(|ip| ip.to_string()).collect(),
            FleetRecord::PublicV6 => self.public_v6.iter().map(|ip| ip.to_string()).collect(),
            FleetRecord::PrivateV4 => self.private_v4.iter().map(|ip| ip.to_string()).collect(),
        }
    }
}

/// Acknowledgement for a paused lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleAck {
    pub group_name: String,
    pub hook_name: String,
    pub action_token: String,
    pub instance_id: String,
    pub result: LifecycleActionResult,
}

/// Command dispatched to proxy nodes through the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteCommand {
    /// Re-run the backend directory builder and reload the proxy
    Rebuild,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ===== ServiceListener Tests =====

    #[test]
    fn test_listener_from_tags() {
        let listener =
            ServiceListener::from_tags(&tags(&[(TAG_PROTOCOL, "udp"), (TAG_PORT, "4978")]));
        assert_eq!(listener, Some(ServiceListener::new(Protocol::Udp, 4978)));
    }

    #[test]
    fn test_listener_from_tags_requires_both() {
        assert!(ServiceListener::from_tags(&tags(&[(TAG_PROTOCOL, "tcp")])).is_none());
        assert!(ServiceListener::from_tags(&tags(&[(TAG_PORT, "3978")])).is_none());
        assert!(ServiceListener::from_tags(&tags(&[])).is_none());
    }

    #[test]
    fn test_listener_from_tags_rejects_garbage() {
        assert!(ServiceListener::from_tags(&tags(&[(TAG_PROTOCOL, "icmp"), (TAG_PORT, "1")])).is_none());
        assert!(ServiceListener::from_tags(&tags(&[(TAG_PROTOCOL, "tcp"), (TAG_PORT, "http")])).is_none());
        assert!(ServiceListener::from_tags(&tags(&[(TAG_PROTOCOL, "tcp"), (TAG_PORT, "0")])).is_none());
        assert!(ServiceListener::from_tags(&tags(&[(TAG_PROTOCOL, "tcp"), (TAG_PORT, "70000")])).is_none());
    }

    #[test]
    fn test_listener_upstream_name() {
        assert_eq!(ServiceListener::new(Protocol::Tcp, 3978).upstream_name(), "tcp3978");
        assert_eq!(ServiceListener::new(Protocol::Udp, 3979).upstream_name(), "udp3979");
    }

    // ===== BackendDirectory Tests =====

    #[test]
    fn test_directory_dedups_endpoints() {
        let listener = ServiceListener::new(Protocol::Tcp, 80);
        let endpoint = BackendEndpoint::new("10.0.0.1".parse().unwrap(), 32768);

        let mut directory = BackendDirectory::new();
        directory.insert(listener, endpoint);
        directory.insert(listener, endpoint);

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.endpoint_count(), 1);
    }

    #[test]
    fn test_directory_iteration_is_sorted() {
        let mut directory = BackendDirectory::new();
        directory.insert(
            ServiceListener::new(Protocol::Udp, 10),
            BackendEndpoint::new("10.0.0.1".parse().unwrap(), 1),
        );
        directory.insert(
            ServiceListener::new(Protocol::Tcp, 20),
            BackendEndpoint::new("10.0.0.1".parse().unwrap(), 1),
        );
        directory.insert(
            ServiceListener::new(Protocol::Tcp, 10),
            BackendEndpoint::new("10.0.0.1".parse().unwrap(), 1),
        );

        let order: Vec<String> = directory.iter().map(|(l, _)| l.to_string()).collect();
        assert_eq!(order, vec!["tcp/10", "tcp/20", "udp/10"]);
    }

    // ===== Task Tests =====

    fn task(last: &str, desired: &str, bindings: Vec<NetworkBinding>) -> Task {
        Task {
            task_id: "t-1".to_string(),
            node_id: Some("ci-1".to_string()),
            last_status: last.to_string(),
            desired_status: desired.to_string(),
            containers: vec![Container {
                name: "app".to_string(),
                network_bindings: bindings,
            }],
        }
    }

    #[test]
    fn test_task_is_running() {
        assert!(task("RUNNING", "RUNNING", vec![]).is_running());
        assert!(!task("RUNNING", "STOPPED", vec![]).is_running());
        assert!(!task("PENDING", "RUNNING", vec![]).is_running());
    }

    #[test]
    fn test_task_host_ports_for_listener() {
        let t = task(
            "RUNNING",
            "RUNNING",
            vec![
                NetworkBinding { container_port: 3978, host_port: 32001, protocol: None },
                NetworkBinding { container_port: 3978, host_port: 32002, protocol: Some(Protocol::Udp) },
                NetworkBinding { container_port: 80, host_port: 32003, protocol: None },
            ],
        );

        let ports = t.host_ports_for(&ServiceListener::new(Protocol::Tcp, 3978));
        assert_eq!(ports, vec![32001]);

        let ports = t.host_ports_for(&ServiceListener::new(Protocol::Udp, 3978));
        assert_eq!(ports, vec![32001, 32002]);
    }

    #[test]
    fn test_task_deserialize_camel_case() {
        let json = r#"{
            "taskId": "t-9",
            "nodeId": "ci-3",
            "lastStatus": "RUNNING",
            "desiredStatus": "RUNNING",
            "containers": [{"name": "game", "networkBindings": [{"containerPort": 3978, "hostPort": 40000}]}]
        }"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.node_id.as_deref(), Some("ci-3"));
        assert_eq!(t.containers[0].network_bindings[0].host_port, 40000);
    }

    // ===== FleetAddresses Tests =====

    #[test]
    fn test_fleet_addresses_add_node() {
        let node = ProxyNode {
            instance_id: "i-1".to_string(),
            private_address: Some("10.0.1.5".parse().unwrap()),
            public_address: Some("203.0.113.5".parse().unwrap()),
            ipv6_address: None,
            lifecycle_state: LifecycleState::InService,
            health_status: None,
        };

        let mut fleet = FleetAddresses::default();
        fleet.add_node(&node);

        assert_eq!(fleet.values(FleetRecord::PublicV4).len(), 1);
        assert!(fleet.values(FleetRecord::PublicV6).is_empty());
        assert!(fleet.values(FleetRecord::PrivateV4).contains("10.0.1.5"));
    }
}
