//! Agent Command Channel
//!
//! Implements CommandChannel by posting jobs to the agent API on each
//! proxy node. Nodes are addressed by their private IPv4 address as
//! reported by the scaling group.

use crate::adapters::inbound::{CommandRequest, CommandStatus};
use crate::domain::entities::RemoteCommand;
use crate::domain::ports::{CommandChannel, ScalingGroup};
use crate::domain::value_objects::InvocationStatus;
use crate::error::{NlbError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Jobs whose routes are kept; older jobs fall back to a fresh lookup.
const MAX_OPEN_JOBS: usize = 64;

/// Where a job's command went on one node.
#[derive(Debug, Clone)]
enum Route {
    Agent(SocketAddr),
    /// The command never reached the node
    Undeliverable(String),
}

/// Per-job routing, dropped once every node reached a final answer.
struct JobRoutes {
    seq: u64,
    nodes: HashMap<String, Route>,
}

pub struct AgentCommandChannel {
    client: reqwest::Client,
    scaling_group: Arc<dyn ScalingGroup>,
    agent_port: u16,
    jobs: DashMap<String, JobRoutes>,
    next_seq: AtomicU64,
}

impl AgentCommandChannel {
    pub fn new(scaling_group: Arc<dyn ScalingGroup>, agent_port: u16) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            scaling_group,
            agent_port,
            jobs: DashMap::new(),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Jobs that still hold routing state.
    pub fn open_jobs(&self) -> usize {
        self.jobs.len()
    }

    async fn agent_address(&self, node_id: &str) -> Result<SocketAddr> {
        let node = self
            .scaling_group
            .describe_instance(node_id)
            .await?
            .ok_or_else(|| NlbError::Command(format!("node {} not found", node_id)))?;
        let private = node
            .private_address
            .ok_or_else(|| NlbError::Command(format!("node {} has no private address", node_id)))?;

        Ok(SocketAddr::new(IpAddr::V4(private), self.agent_port))
    }

    fn route(&self, job_id: &str, node_id: &str) -> Option<Route> {
        self.jobs.get(job_id)?.nodes.get(node_id).cloned()
    }

    /// Forget a node's route; the job goes once it has none left.
    fn settle(&self, job_id: &str, node_id: &str) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.nodes.remove(node_id);
        }
        self.jobs.remove_if(job_id, |_, job| job.nodes.is_empty());
    }

    fn prune_oldest(&self) {
        while self.jobs.len() > MAX_OPEN_JOBS {
            let oldest = self
                .jobs
                .iter()
                .min_by_key(|entry| entry.value().seq)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(job_id) => {
                    tracing::debug!(job = %job_id, "dropping routes of abandoned job");
                    self.jobs.remove(&job_id);
                }
                None => break,
            }
        }
    }

    async fn dispatch(&self, node_id: &str, request: &CommandRequest) -> Result<SocketAddr> {
        let addr = self.agent_address(node_id).await?;
        let url = format!("http://{}/api/v1/commands", addr);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| NlbError::Command(format!("POST {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(NlbError::Command(format!(
                "POST {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(addr)
    }
}

#[async_trait]
impl CommandChannel for AgentCommandChannel {
    async fn send_command(&self, node_ids: &[String], command: RemoteCommand) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let request = CommandRequest {
            job_id: job_id.clone(),
            command,
        };

        let results = join_all(node_ids.iter().map(|node_id| self.dispatch(node_id, &request))).await;

        let mut routes = HashMap::new();
        let mut failed = 0;
        for (node_id, result) in node_ids.iter().zip(results) {
            match result {
                Ok(addr) => {
                    routes.insert(node_id.clone(), Route::Agent(addr));
                }
                Err(e) => {
                    tracing::warn!(job = %job_id, node = %node_id, "failed to dispatch command: {}", e);
                    routes.insert(node_id.clone(), Route::Undeliverable(e.to_string()));
                    failed += 1;
                }
            }
        }

        if !node_ids.is_empty() && failed == node_ids.len() {
            return Err(NlbError::Command(format!(
                "command could not be dispatched to any of {} nodes",
                failed
            )));
        }

        if !routes.is_empty() {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            self.jobs.insert(job_id.clone(), JobRoutes { seq, nodes: routes });
            self.prune_oldest();
        }

        Ok(job_id)
    }

    async fn get_invocation(&self, job_id: &str, node_id: &str) -> Result<InvocationStatus> {
        let addr = match self.route(job_id, node_id) {
            Some(Route::Agent(addr)) => addr,
            Some(Route::Undeliverable(reason)) => {
                self.settle(job_id, node_id);
                return Err(NlbError::Command(reason));
            }
            None => self.agent_address(node_id).await?,
        };
        let url = format!("http://{}/api/v1/commands/{}", addr, job_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NlbError::Command(format!("GET {} failed: {}", url, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(NlbError::CommandNotYetVisible {
                job_id: job_id.to_string(),
                node_id: node_id.to_string(),
            }),
            status if status.is_success() => {
                let body: CommandStatus = response
                    .json()
                    .await
                    .map_err(|e| NlbError::Command(format!("GET {} returned invalid JSON: {}", url, e)))?;
                if body.status.is_terminal() {
                    self.settle(job_id, node_id);
                }
                Ok(body.status)
            }
            status => Err(NlbError::Command(format!("GET {} returned {}", url, status))),
        }
    }
}
