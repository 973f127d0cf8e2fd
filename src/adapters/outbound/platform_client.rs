//! Platform API Client
//!
//! Implements ClusterQuery and ScalingGroup against the platform's REST
//! API. All payloads are JSON.

use crate::domain::entities::{ClusterNode, LifecycleAck, ProxyNode, Task};
use crate::domain::ports::{ClusterQuery, ScalingGroup};
use crate::error::{NlbError, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// Request timeout for platform calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which port an error belongs to.
#[derive(Debug, Clone, Copy)]
enum Api {
    Cluster,
    Group,
}

impl Api {
    fn error(self, message: String) -> NlbError {
        match self {
            Api::Cluster => NlbError::Orchestrator(message),
            Api::Group => NlbError::ScalingGroup(message),
        }
    }
}

/// REST client for the orchestration cluster and the scaling group.
#[derive(Clone)]
pub struct PlatformClient {
    base: Url,
    client: reqwest::Client,
}

impl PlatformClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| NlbError::Config(format!("invalid platform API url {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(NlbError::Config(format!(
                "platform API url {} cannot carry a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base, client })
    }

    /// Build a URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET a JSON document; `None` on 404.
    async fn get_optional<T: DeserializeOwned>(&self, api: Api, segments: &[&str]) -> Result<Option<T>> {
        let url = self.url(segments);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| api.error(format!("GET {} failed: {}", url.path(), e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api.error(format!("GET {} returned {}: {}", url.path(), status, body)));
        }

        let value = response
            .json()
            .await
            .map_err(|e| api.error(format!("GET {} returned invalid JSON: {}", url.path(), e)))?;
        Ok(Some(value))
    }

    async fn get<T: DeserializeOwned>(&self, api: Api, segments: &[&str]) -> Result<T> {
        self.get_optional(api, segments)
            .await?
            .ok_or_else(|| api.error(format!("/{} not found", segments.join("/"))))
    }

    async fn post<B: Serialize + ?Sized>(&self, api: Api, segments: &[&str], body: &B) -> Result<()> {
        let url = self.url(segments);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| api.error(format!("POST {} failed: {}", url.path(), e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(api.error(format!("POST {} returned {}: {}", url.path(), status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterQuery for PlatformClient {
    async fn list_cluster_nodes(&self, cluster: &str) -> Result<Vec<ClusterNode>> {
        self.get(Api::Cluster, &["clusters", cluster, "nodes"]).await
    }

    async fn resolve_node_address(&self, instance_id: &str) -> Result<Option<IpAddr>> {
        let instance: Option<ProxyNode> = self
            .get_optional(Api::Cluster, &["instances", instance_id])
            .await?;
        Ok(instance.and_then(|i| i.private_address).map(IpAddr::V4))
    }

    async fn list_services(&self, cluster: &str) -> Result<Vec<String>> {
        self.get(Api::Cluster, &["clusters", cluster, "services"]).await
    }

    async fn service_tags(&self, service: &str) -> Result<HashMap<String, String>> {
        // Untagged services may have no tag document at all.
        Ok(self
            .get_optional(Api::Cluster, &["services", service, "tags"])
            .await?
            .unwrap_or_default())
    }

    async fn list_tasks(&self, cluster: &str, service: &str) -> Result<Vec<Task>> {
        self.get(Api::Cluster, &["clusters", cluster, "services", service, "tasks"])
            .await
    }
}

#[async_trait]
impl ScalingGroup for PlatformClient {
    async fn describe_members(&self, group: &str) -> Result<Vec<ProxyNode>> {
        self.get(Api::Group, &["groups", group, "members"]).await
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Option<ProxyNode>> {
        self.get_optional(Api::Group, &["instances", instance_id]).await
    }

    async fn complete_lifecycle_action(&self, ack: &LifecycleAck) -> Result<()> {
        tracing::info!(
            node = %ack.instance_id,
            hook = %ack.hook_name,
            result = ?ack.result,
            "completing lifecycle action"
        );
        self.post(
            Api::Group,
            &["groups", ack.group_name.as_str(), "lifecycle-actions", "complete"],
            ack,
        )
        .await
    }

    async fn record_lifecycle_heartbeat(&self, ack: &LifecycleAck) -> Result<()> {
        self.post(
            Api::Group,
            &["groups", ack.group_name.as_str(), "lifecycle-actions", "heartbeat"],
            ack,
        )
        .await
    }
}
