//! Backend Directory Service
//!
//! Runs on every proxy node. Walks the orchestration cluster, assembles
//! the backend directory, installs the rendered stream configuration and
//! reloads the proxy.

use crate::domain::entities::{BackendDirectory, ServiceListener};
use crate::domain::ports::{ClusterQuery, ProxyReloader};
use crate::domain::services::{ConfigRenderer, DirectoryBuilder};
use crate::error::{NlbError, Result};
use crate::infrastructure::install_if_changed;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Directory plus bookkeeping about what had to be left out.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub directory: BackendDirectory,
    /// Services without a complete listener tag pair
    pub untagged_services: usize,
    /// Services whose tags or tasks could not be read
    pub failed_services: usize,
    /// Running tasks dropped because their host was not resolvable
    pub dropped_tasks: usize,
}

/// Result of one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// New configuration written and proxy reloaded
    Installed { listeners: usize, endpoints: usize },
    /// Rendered configuration matched the installed file
    Unchanged { listeners: usize, endpoints: usize },
}

/// Backend directory builder use case.
pub struct BackendDirectoryService {
    cluster: String,
    query: Arc<dyn ClusterQuery>,
    reloader: Arc<dyn ProxyReloader>,
    output_path: PathBuf,
    /// Installed file may not be loaded by the proxy yet. Starts set so
    /// the first rebuild of a process always reloads.
    reload_pending: AtomicBool,
}

impl BackendDirectoryService {
    pub fn new(
        cluster: String,
        query: Arc<dyn ClusterQuery>,
        reloader: Arc<dyn ProxyReloader>,
        output_path: PathBuf,
    ) -> Self {
        Self {
            cluster,
            query,
            reloader,
            output_path,
            reload_pending: AtomicBool::new(true),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Assemble the directory from live cluster state.
    ///
    /// Fails only when the cluster cannot be read at all; individual
    /// services and hosts that cannot be resolved are left out.
    pub async fn build_directory(&self) -> Result<BuildReport> {
        let node_addresses = self.resolve_node_addresses().await?;
        let services = self.query.list_services(&self.cluster).await?;

        let mut report = BuildReport::default();

        for service in &services {
            let tags = match self.query.service_tags(service).await {
                Ok(tags) => tags,
                Err(e) => {
                    tracing::warn!(service = %service, "failed to read service tags: {}", e);
                    report.failed_services += 1;
                    continue;
                }
            };

            let Some(listener) = ServiceListener::from_tags(&tags) else {
                report.untagged_services += 1;
                continue;
            };

            let tasks = match self.query.list_tasks(&self.cluster, service).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    tracing::warn!(
                        service = %service,
                        listener = %listener,
                        "failed to list tasks: {}",
                        e
                    );
                    report.failed_services += 1;
                    continue;
                }
            };

            report.dropped_tasks += DirectoryBuilder::collect_endpoints(
                &mut report.directory,
                listener,
                &tasks,
                &node_addresses,
            );
        }

        if report.directory.is_empty() && report.dropped_tasks > 0 {
            return Err(NlbError::Orchestrator(format!(
                "all {} running tasks were on unresolvable hosts",
                report.dropped_tasks
            )));
        }

        if report.directory.is_empty() && report.failed_services > 0 {
            return Err(NlbError::Orchestrator(format!(
                "{} of {} services could not be read and no endpoints were found",
                report.failed_services,
                services.len()
            )));
        }

        Ok(report)
    }

    /// Build and render without touching the installed file.
    pub async fn render(&self) -> Result<String> {
        let report = self.build_directory().await?;
        Ok(ConfigRenderer::render(&report.directory))
    }

    /// Rebuild the configuration and reload the proxy if it changed.
    ///
    /// If the cluster cannot be read the previously installed file is left
    /// untouched. A failed reload is retried by the next rebuild.
    pub async fn rebuild(&self) -> Result<RebuildOutcome> {
        let report = self.build_directory().await?;
        let listeners = report.directory.len();
        let endpoints = report.directory.endpoint_count();
        let rendered = ConfigRenderer::render(&report.directory);

        let changed = install_if_changed(&self.output_path, &rendered).await?;
        if !changed && !self.reload_pending.load(Ordering::SeqCst) {
            tracing::info!(
                listeners,
                endpoints,
                "stream configuration unchanged, skipping reload"
            );
            return Ok(RebuildOutcome::Unchanged { listeners, endpoints });
        }

        if changed {
            self.reload_pending.store(true, Ordering::SeqCst);
            tracing::info!(
                path = %self.output_path.display(),
                listeners,
                endpoints,
                untagged = report.untagged_services,
                failed = report.failed_services,
                dropped = report.dropped_tasks,
                "stream configuration installed"
            );
        } else {
            tracing::info!(listeners, endpoints, "reloading proxy for already installed configuration");
        }

        self.reloader.reload().await?;
        self.reload_pending.store(false, Ordering::SeqCst);
        Ok(RebuildOutcome::Installed { listeners, endpoints })
    }

    /// Map every active cluster node to its host address.
    ///
    /// Fails when there are active nodes, none resolved and at least one
    /// lookup errored: the instance directory is down, not the nodes.
    async fn resolve_node_addresses(&self) -> Result<HashMap<String, IpAddr>> {
        let nodes = self.query.list_cluster_nodes(&self.cluster).await?;
        let mut addresses = HashMap::new();
        let mut active = 0usize;
        let mut lookup_errors = 0usize;
        let mut last_error = None;

        for node in nodes.iter().filter(|n| n.is_active()) {
            active += 1;
            match self.query.resolve_node_address(&node.instance_id).await {
                Ok(Some(address)) => {
                    addresses.insert(node.node_id.clone(), address);
                }
                Ok(None) => {
                    tracing::warn!(
                        node = %node.node_id,
                        instance = %node.instance_id,
                        "cluster node has no private address"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        node = %node.node_id,
                        instance = %node.instance_id,
                        "failed to resolve cluster node: {}",
                        e
                    );
                    lookup_errors += 1;
                    last_error = Some(e);
                }
            }
        }

        tracing::debug!(
            cluster = %self.cluster,
            nodes = nodes.len(),
            resolved = addresses.len(),
            lookup_errors,
            "resolved cluster nodes"
        );

        if addresses.is_empty() && lookup_errors > 0 {
            let cause = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(NlbError::Orchestrator(format!(
                "could not resolve any of {} active cluster nodes: {}",
                active, cause
            )));
        }

        Ok(addresses)
    }
}
