mod agent_command_channel;
mod command_reloader;
mod dashmap_dns_directory;
mod http_health_probe;
mod platform_client;

pub use agent_command_channel::AgentCommandChannel;
pub use command_reloader::CommandReloader;
pub use dashmap_dns_directory::DashMapDnsDirectory;
pub use http_health_probe::HttpHealthProbe;
pub use platform_client::PlatformClient;
