//! Graceful Shutdown Handler
//!
//! Coordinates shutdown of the servers and lets in-flight reconciler
//! invocations finish before the process exits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Shutdown coordinator for graceful termination.
///
/// Tracks in-flight handler invocations and signals shutdown to servers.
#[derive(Clone)]
pub struct ShutdownController {
    /// Whether shutdown has been initiated
    shutdown_initiated: Arc<AtomicBool>,
    /// Number of invocations still running
    in_flight: Arc<AtomicUsize>,
    /// Broadcast channel for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Notify when the last invocation finishes
    drain_complete: Arc<Notify>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            drain_complete: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiate graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            tracing::info!("initiating graceful shutdown");
            let _ = self.shutdown_tx.send(());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Wait for in-flight invocations to finish (with timeout).
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let notified = self.drain_complete.notified();
        if self.in_flight() == 0 {
            return true;
        }

        tokio::select! {
            _ = notified => true,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    "drain timeout: {} invocations still running",
                    self.in_flight()
                );
                false
            }
        }
    }

    /// Track an invocation until the guard is dropped.
    pub fn invocation_guard(&self) -> InvocationGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InvocationGuard {
            controller: self.clone(),
        }
    }

    fn invocation_ended(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.drain_complete.notify_waiters();
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one in-flight invocation.
pub struct InvocationGuard {
    controller: ShutdownController,
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        self.controller.invocation_ended();
    }
}

/// Resolves when SIGINT or SIGTERM arrives, then triggers shutdown.
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    controller.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_controller_new() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shutdown());
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn test_shutdown_initiates_once() {
        let controller = ShutdownController::new();

        controller.shutdown();
        assert!(controller.is_shutdown());

        controller.shutdown();
        assert!(controller.is_shutdown());
    }

    #[test]
    fn test_invocation_guard_tracks_in_flight() {
        let controller = ShutdownController::new();

        let first = controller.invocation_guard();
        let second = controller.invocation_guard();
        assert_eq!(controller.in_flight(), 2);

        drop(first);
        assert_eq!(controller.in_flight(), 1);

        drop(second);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_drain_immediate_when_idle() {
        let controller = ShutdownController::new();
        assert!(controller.wait_for_drain(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_for_drain_times_out() {
        let controller = ShutdownController::new();
        let _guard = controller.invocation_guard();

        assert!(!controller.wait_for_drain(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_wait_for_drain_completes_when_guard_dropped() {
        let controller = ShutdownController::new();
        let guard = controller.invocation_guard();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_wait_resolves_after_shutdown() {
        let controller = ShutdownController::new();
        let waiter = controller.clone();

        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
