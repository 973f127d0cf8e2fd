//! In-memory fakes for the outbound ports, shared by the integration tests.
//!
//! Every fake appends to an optional shared `CallLog` so tests can assert
//! the order in which the reconcilers touched their collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use nlb_control::domain::entities::{
    ClusterNode, Container, DnsRecordSet, LifecycleAck, NetworkBinding, ProxyNode, RemoteCommand, Task,
    TAG_PORT, TAG_PROTOCOL,
};
use nlb_control::domain::ports::{ClusterQuery, CommandChannel, DnsDirectory, HealthProbe, ProxyReloader, ScalingGroup};
use nlb_control::domain::value_objects::{InvocationStatus, LifecycleState, RecordType};
use nlb_control::error::{NlbError, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ===== Call Log =====

#[derive(Default, Clone)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }
}

// ===== Cluster =====

#[derive(Clone)]
pub struct FakeService {
    pub tags: HashMap<String, String>,
    pub tasks: Vec<Task>,
}

#[derive(Default)]
pub struct FakeCluster {
    pub nodes: Mutex<Vec<ClusterNode>>,
    pub addresses: Mutex<HashMap<String, IpAddr>>,
    pub services: Mutex<BTreeMap<String, FakeService>>,
    /// Services whose task listing fails
    pub broken_services: Mutex<HashSet<String>>,
    /// Fail every listing call
    pub unreachable: AtomicBool,
    /// Fail instance address lookups only
    pub lookup_down: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active cluster node backed by `instance_id` at `address`.
    pub fn add_node(&self, node_id: &str, instance_id: &str, address: &str) {
        self.nodes.lock().unwrap().push(ClusterNode {
            node_id: node_id.to_string(),
            instance_id: instance_id.to_string(),
            status: "ACTIVE".to_string(),
        });
        self.addresses
            .lock()
            .unwrap()
            .insert(instance_id.to_string(), address.parse().unwrap());
    }

    pub fn add_service(&self, name: &str, tags: &[(&str, &str)], tasks: Vec<Task>) {
        let tags = tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.services
            .lock()
            .unwrap()
            .insert(name.to_string(), FakeService { tags, tasks });
    }

    /// Service tagged with a listener.
    pub fn add_listener_service(&self, name: &str, protocol: &str, port: u16, tasks: Vec<Task>) {
        let port = port.to_string();
        self.add_service(name, &[(TAG_PROTOCOL, protocol), (TAG_PORT, port.as_str())], tasks);
    }

    pub fn break_service(&self, name: &str) {
        self.broken_services.lock().unwrap().insert(name.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(NlbError::Orchestrator("cluster unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterQuery for FakeCluster {
    async fn list_cluster_nodes(&self, _cluster: &str) -> Result<Vec<ClusterNode>> {
        self.check_reachable()?;
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn resolve_node_address(&self, instance_id: &str) -> Result<Option<IpAddr>> {
        self.check_reachable()?;
        if self.lookup_down.load(Ordering::SeqCst) {
            return Err(NlbError::Orchestrator("instance lookup unavailable".to_string()));
        }
        Ok(self.addresses.lock().unwrap().get(instance_id).copied())
    }

    async fn list_services(&self, _cluster: &str) -> Result<Vec<String>> {
        self.check_reachable()?;
        Ok(self.services.lock().unwrap().keys().cloned().collect())
    }

    async fn service_tags(&self, service: &str) -> Result<HashMap<String, String>> {
        self.check_reachable()?;
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(service)
            .map(|s| s.tags.clone())
            .unwrap_or_default())
    }

    async fn list_tasks(&self, _cluster: &str, service: &str) -> Result<Vec<Task>> {
        self.check_reachable()?;
        if self.broken_services.lock().unwrap().contains(service) {
            return Err(NlbError::Orchestrator(format!("tasks of {} unavailable", service)));
        }
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(service)
            .map(|s| s.tasks.clone())
            .unwrap_or_default())
    }
}

/// Running task on `node_id` binding `container_port` to `host_port`.
pub fn running_task(task_id: &str, node_id: &str, container_port: u16, host_port: u16) -> Task {
    Task {
        task_id: task_id.to_string(),
        node_id: Some(node_id.to_string()),
        last_status: "RUNNING".to_string(),
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

// ===== Scaling Group =====

#[derive(Default)]
pub struct FakeScalingGroup {
    pub members: Mutex<Vec<ProxyNode>>,
    pub acks: Mutex<Vec<LifecycleAck>>,
    pub heartbeats: AtomicUsize,
    pub describe_calls: AtomicUsize,
    pub fail_describe: AtomicBool,
    /// `describe_members` never returns
    pub hang_describe: AtomicBool,
    pub log: CallLog,
}

impl FakeScalingGroup {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn add_member(&self, node: ProxyNode) {
        self.members.lock().unwrap().push(node);
    }

    pub fn set_state(&self, instance_id: &str, state: LifecycleState) {
        if let Some(m) = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.instance_id == instance_id)
        {
            m.lifecycle_state = state;
        }
    }

    pub fn acked(&self) -> Vec<String> {
        self.acks.lock().unwrap().iter().map(|a| a.instance_id.clone()).collect()
    }
}

#[async_trait]
impl ScalingGroup for FakeScalingGroup {
    async fn describe_members(&self, _group: &str) -> Result<Vec<ProxyNode>> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push("describe_members");
        if self.fail_describe.load(Ordering::SeqCst) {
            return Err(NlbError::ScalingGroup("throttled".to_string()));
        }
        if self.hang_describe.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.members.lock().unwrap().clone())
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<ProxyNode>> {
        self.log.push(format!("describe_instance:{}", instance_id));
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.instance_id == instance_id)
            .cloned())
    }

    /// Completing a launch hook moves the member on like the real group does.
    async fn complete_lifecycle_action(&self, ack: &LifecycleAck) -> Result<()> {
        self.log.push(format!("ack:{}", ack.instance_id));
        if let Some(m) = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.instance_id == ack.instance_id)
        {
            if m.lifecycle_state == LifecycleState::PendingWait {
                m.lifecycle_state = LifecycleState::PendingProceed;
            }
        }
        self.acks.lock().unwrap().push(ack.clone());
        Ok(())
    }

    async fn record_lifecycle_heartbeat(&self, ack: &LifecycleAck) -> Result<()> {
        self.log.push(format!("heartbeat:{}", ack.instance_id));
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Member with private, public and optionally IPv6 addresses.
pub fn proxy_node(instance_id: &str, index: u8, state: LifecycleState, ipv6: bool) -> ProxyNode {
    ProxyNode {
        instance_id: instance_id.to_string(),
        private_address: Some(Ipv4Addr::new(10, 0, 1, index)),
        public_address: Some(Ipv4Addr::new(203, 0, 113, index)),
        ipv6_address: ipv6.then(|| Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, index as u16)),
        lifecycle_state: state,
        health_status: Some("Healthy".to_string()),
    }
}

// ===== DNS Directory =====

#[derive(Default)]
pub struct RecordingDns {
    pub upserts: Mutex<Vec<DnsRecordSet>>,
    pub current: Mutex<BTreeMap<(String, RecordType), DnsRecordSet>>,
    pub fail: AtomicBool,
    pub log: CallLog,
}

impl RecordingDns {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }

    pub fn values(&self, name: &str, record_type: RecordType) -> Vec<String> {
        self.current
            .lock()
            .unwrap()
            .get(&(name.to_string(), record_type))
            .map(|r| r.values.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DnsDirectory for RecordingDns {
    async fn upsert(&self, record_set: DnsRecordSet) -> Result<()> {
        self.log
            .push(format!("upsert:{}:{}", record_set.name, record_set.record_type));
        if self.fail.load(Ordering::SeqCst) {
            return Err(NlbError::Dns("zone unavailable".to_string()));
        }
        assert!(!record_set.values.is_empty(), "empty record set published");
        self.upserts.lock().unwrap().push(record_set.clone());
        self.current
            .lock()
            .unwrap()
            .insert((record_set.name.clone(), record_set.record_type), record_set);
        Ok(())
    }

    async fn lookup(&self, name: &str, record_type: RecordType) -> Option<DnsRecordSet> {
        self.current
            .lock()
            .unwrap()
            .get(&(name.to_string(), record_type))
            .cloned()
    }
}

// ===== Command Channel =====

#[derive(Debug, Clone)]
pub enum Step {
    NotYetVisible,
    Status(InvocationStatus),
    Error(String),
}

#[derive(Default)]
pub struct FakeCommandChannel {
    /// Per-node answers; the last one repeats
    pub scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    pub sent: Mutex<Vec<Vec<String>>>,
    pub polls: Mutex<HashMap<String, usize>>,
    pub fail_send: AtomicBool,
}

impl FakeCommandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, node_id: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(node_id.to_string(), steps.into_iter().collect());
    }

    pub fn polls_for(&self, node_id: &str) -> usize {
        self.polls.lock().unwrap().get(node_id).copied().unwrap_or(0)
    }

    pub fn sent_to(&self) -> Vec<Vec<String>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandChannel for FakeCommandChannel {
    async fn send_command(&self, node_ids: &[String], _command: RemoteCommand) -> Result<String> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(NlbError::Command("send rejected".to_string()));
        }
        self.sent.lock().unwrap().push(node_ids.to_vec());
        Ok("job-1".to_string())
    }

    async fn get_invocation(&self, job_id: &str, node_id: &str) -> Result<InvocationStatus> {
        *self.polls.lock().unwrap().entry(node_id.to_string()).or_default() += 1;

        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(node_id) {
                Some(steps) if steps.len() > 1 => steps.pop_front(),
                Some(steps) => steps.front().cloned(),
                None => Some(Step::Status(InvocationStatus::Success)),
            }
        };

        match step {
            Some(Step::Status(status)) => Ok(status),
            Some(Step::Error(message)) => Err(NlbError::Command(message)),
            Some(Step::NotYetVisible) | None => Err(NlbError::CommandNotYetVisible {
                job_id: job_id.to_string(),
                node_id: node_id.to_string(),
            }),
        }
    }
}

// ===== Health Probe =====

/// Answers from a script, then repeats the last answer.
pub struct ScriptedProbe {
    answers: Mutex<VecDeque<bool>>,
    pub calls: AtomicUsize,
    pub log: CallLog,
}

impl ScriptedProbe {
    pub fn new(answers: Vec<bool>, log: CallLog) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            calls: AtomicUsize::new(0),
            log,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, address: IpAddr) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("probe:{}", address));
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap_or(false)
        } else {
            answers.front().copied().unwrap_or(false)
        }
    }
}

// ===== Proxy Reloader =====

#[derive(Default)]
pub struct CountingReloader {
    pub reloads: AtomicUsize,
    /// Number of upcoming reloads that fail
    pub failures: AtomicUsize,
}

impl CountingReloader {
    /// Reloader whose first `failures` calls fail.
    pub fn failing(failures: usize) -> Self {
        Self {
            reloads: AtomicUsize::new(0),
            failures: AtomicUsize::new(failures),
        }
    }

    /// Every reload attempt, failed ones included.
    pub fn count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyReloader for CountingReloader {
    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NlbError::Reload("proxy busy".to_string()));
        }
        Ok(())
    }
}
