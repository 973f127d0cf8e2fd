mod cluster_query;
mod command_channel;
mod dns_directory;
mod health_probe;
mod proxy_reloader;
mod scaling_group;

pub use cluster_query::ClusterQuery;
pub use command_channel::CommandChannel;
pub use dns_directory::DnsDirectory;
pub use health_probe::HealthProbe;
pub use proxy_reloader::ProxyReloader;
pub use scaling_group::ScalingGroup;
