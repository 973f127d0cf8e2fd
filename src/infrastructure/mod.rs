//! Infrastructure Layer
//!
//! Cross-cutting concerns: deadlines, health gating, config file install
//! and graceful shutdown.

pub mod config_file;
pub mod deadline;
pub mod health_checker;
pub mod shutdown;

pub use config_file::install_if_changed;
pub use deadline::Deadline;
pub use health_checker::{HealthCheckConfig, HealthChecker, HealthStatus};
pub use shutdown::{shutdown_signal, InvocationGuard, ShutdownController};
