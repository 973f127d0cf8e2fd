//! Invocation Deadlines
//!
//! Every handler activation runs under a hard deadline. Polling loops are
//! raced against it and abandoned when it passes.

use crate::error::{NlbError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Point in time by which an invocation must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Earlier deadline that leaves `grace` of this one for a final step.
    pub fn reserve(&self, grace: Duration) -> Self {
        Self {
            at: self.at.checked_sub(grace).unwrap_or_else(Instant::now),
        }
    }

    /// Run `fut` to completion or fail with `DeadlineExceeded`.
    ///
    /// `what` names the operation in the error and the log line.
    pub async fn run<F, T>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(value) => Ok(value),
            Err(_) => {
                tracing::warn!("deadline exceeded while {}", what);
                Err(NlbError::DeadlineExceeded(what.to_string()))
            }
        }
    }
}
