//! Error types for the load-balancer control plane.

use thiserror::Error;

/// Errors raised by the reconcilers and their external collaborators.
#[derive(Debug, Error)]
pub enum NlbError {
    /// The orchestration cluster could not be queried
    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    /// The scaling group could not be queried or acknowledged
    #[error("scaling group error: {0}")]
    ScalingGroup(String),

    /// A remote command could not be dispatched or polled
    #[error("command channel error: {0}")]
    Command(String),

    /// The command invocation has not shown up on the node yet
    #[error("command {job_id} not yet visible on {node_id}")]
    CommandNotYetVisible { job_id: String, node_id: String },

    /// The DNS Directory rejected or failed an upsert
    #[error("DNS directory error: {0}")]
    Dns(String),

    /// An empty value set was about to be published
    #[error("refusing to publish empty record set for {0}")]
    EmptyRecordSet(String),

    /// The local proxy process did not reload
    #[error("proxy reload failed: {0}")]
    Reload(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (configuration file, sockets)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A trigger payload could not be understood
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The invocation deadline passed before the operation completed
    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(String),
}

impl NlbError {
    /// Whether the error is a transient lookup failure that should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, NlbError::CommandNotYetVisible { .. })
    }
}

pub type Result<T> = std::result::Result<T, NlbError>;
