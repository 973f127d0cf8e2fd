//! Health Probe Port

use async_trait::async_trait;
use std::net::IpAddr;

/// Single readiness probe against a proxy node.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// True only if the node answered its health endpoint with success.
    async fn probe(&self, address: IpAddr) -> bool;
}
