//! nlb-control Library
//!
//! Control plane for a self-managed, IPv6-capable network load balancer:
//! backend directory rendering on proxy nodes, rebuild fan-out on cluster
//! changes, and health-gated fleet membership published through DNS.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{
    BackendDirectoryService, ClusterChangeReconciler, DnsPublisher, ScalingLifecycleReconciler,
};
pub use config::{load_config, Config};
pub use domain::entities::{BackendDirectory, BackendEndpoint, DnsRecordSet, ProxyNode, ServiceListener};
pub use domain::ports::{ClusterQuery, CommandChannel, DnsDirectory, HealthProbe, ProxyReloader, ScalingGroup};
pub use error::{NlbError, Result};
