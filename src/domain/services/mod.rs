mod config_renderer;
mod directory_builder;
mod membership;

pub use config_renderer::{ConfigRenderer, UDP_PROXY_TIMEOUT};
pub use directory_builder::DirectoryBuilder;
pub use membership::{Membership, MembershipOverride};
