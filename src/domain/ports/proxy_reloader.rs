//! Proxy Reloader Port

use crate::error::Result;
use async_trait::async_trait;

/// Signals the local stream proxy to pick up a new configuration file.
#[async_trait]
pub trait ProxyReloader: Send + Sync {
    async fn reload(&self) -> Result<()>;
}
