//! Application Layer
//!
//! Use cases wiring domain services to ports.

pub mod cluster_reconciler;
pub mod directory_service;
pub mod dns_publisher;
pub mod lifecycle_reconciler;

pub use cluster_reconciler::{
    ClusterChangeReconciler, ClusterOutcome, ClusterReconcilerConfig, FanOutReport, NodeCommandResult,
    NodeOutcome,
};
pub use directory_service::{BackendDirectoryService, BuildReport, RebuildOutcome};
pub use dns_publisher::{service_aliases, DnsPublisher, FleetNames, PublishReport, TaggedAliases, DEFAULT_TTL};
pub use lifecycle_reconciler::{LifecycleOutcome, ScalingLifecycleReconciler, ACK_GRACE};
