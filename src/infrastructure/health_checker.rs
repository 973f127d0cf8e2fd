//! Health Gate
//!
//! Polls a launching proxy node's health endpoint until it has passed
//! enough consecutive probes to receive traffic.

use crate::domain::ports::HealthProbe;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between probes
    pub interval: Duration,
    /// Number of consecutive successes before the node counts as healthy
    pub healthy_threshold: u32,
    /// How long to poll before extending the lifecycle hook again
    pub heartbeat_interval: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            healthy_threshold: 1,
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Progress of one health gate.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the threshold has been met
    pub healthy: bool,
    /// Probes sent so far
    pub polls: u32,
    /// Consecutive successes
    pub consecutive_successes: u32,
    /// Consecutive failures
    pub consecutive_failures: u32,
    /// Heartbeats recorded while waiting
    pub heartbeats: u32,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            healthy: false,
            polls: 0,
            consecutive_successes: 0,
            consecutive_failures: 0,
            heartbeats: 0,
        }
    }
}

/// Consecutive-success gate in front of node admission.
pub struct HealthChecker {
    config: HealthCheckConfig,
    probe: Arc<dyn HealthProbe>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig, probe: Arc<dyn HealthProbe>) -> Self {
        Self { config, probe }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Poll `address` until it is healthy.
    ///
    /// There is no retry limit here: callers bound the wait with the
    /// invocation deadline. `on_heartbeat` runs every time the wait has
    /// gone on for another `heartbeat_interval`.
    pub async fn wait_until_healthy<F, Fut>(&self, address: IpAddr, mut on_heartbeat: F) -> HealthStatus
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut status = HealthStatus::default();
        let mut since_heartbeat = Instant::now();

        loop {
            let ok = self.probe.probe(address).await;
            Self::update_status(&mut status, ok, &self.config);

            if status.healthy {
                tracing::info!(
                    address = %address,
                    polls = status.polls,
                    "node passed health check"
                );
                return status;
            }

            tracing::debug!(
                address = %address,
                polls = status.polls,
                successes = status.consecutive_successes,
                "waiting for node to become healthy"
            );

            if since_heartbeat.elapsed() >= self.config.heartbeat_interval {
                on_heartbeat().await;
                status.heartbeats += 1;
                since_heartbeat = Instant::now();
            }

            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Update health status based on a probe result.
    fn update_status(status: &mut HealthStatus, ok: bool, config: &HealthCheckConfig) {
        status.polls += 1;
        if ok {
            status.consecutive_successes += 1;
            status.consecutive_failures = 0;
        } else {
            status.consecutive_failures += 1;
            status.consecutive_successes = 0;
        }
        status.healthy = status.consecutive_successes >= config.healthy_threshold.max(1);
    }
}
