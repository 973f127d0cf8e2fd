//! Event Trigger API
//!
//! Delivers cluster task-state changes and scaling-group lifecycle
//! notifications to the reconcilers. Each surface runs at most one
//! invocation at a time; later deliveries queue behind it. Every
//! invocation runs under a hard deadline.

use crate::application::{
    ClusterChangeReconciler, ClusterOutcome, FanOutReport, LifecycleOutcome, NodeOutcome, PublishReport,
    ScalingLifecycleReconciler,
};
use crate::domain::events::{LifecycleEvent, TaskStateChange};
use crate::domain::value_objects::LifecycleTransition;
use crate::error::NlbError;
use crate::infrastructure::{Deadline, ShutdownController};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

/// Hard invocation deadlines per trigger.
#[derive(Debug, Clone, Copy)]
pub struct EventTimeouts {
    pub task_change: Duration,
    pub launch: Duration,
    pub terminate: Duration,
}

impl Default for EventTimeouts {
    fn default() -> Self {
        Self {
            task_change: Duration::from_secs(60),
            launch: Duration::from_secs(180),
            terminate: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct EventState {
    cluster: Arc<ClusterChangeReconciler>,
    lifecycle: Arc<ScalingLifecycleReconciler>,
    cluster_slot: Arc<Semaphore>,
    lifecycle_slot: Arc<Semaphore>,
    timeouts: EventTimeouts,
    shutdown: ShutdownController,
}

impl EventState {
    pub fn new(
        cluster: Arc<ClusterChangeReconciler>,
        lifecycle: Arc<ScalingLifecycleReconciler>,
        timeouts: EventTimeouts,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            cluster,
            lifecycle,
            cluster_slot: Arc::new(Semaphore::new(1)),
            lifecycle_slot: Arc::new(Semaphore::new(1)),
            timeouts,
            shutdown,
        }
    }
}

pub struct EventApi {
    listen_addr: String,
    state: EventState,
}

impl EventApi {
    pub fn new(listen_addr: String, state: EventState) -> Self {
        Self { listen_addr, state }
    }

    pub fn router(state: EventState) -> Router {
        Router::new()
            .route("/events/task-state-change", post(task_state_change_handler))
            .route("/events/lifecycle", post(lifecycle_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve until shutdown is signalled.
    pub async fn run(&self) -> anyhow::Result<()> {
        let app = Self::router(self.state.clone());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("event API listening on {}", self.listen_addr);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        Ok(())
    }
}

// Handler functions

async fn task_state_change_handler(
    State(state): State<EventState>,
    Json(event): Json<TaskStateChange>,
) -> Response {
    if state.shutdown.is_shutdown() {
        return shutting_down();
    }

    let Ok(_permit) = state.cluster_slot.clone().acquire_owned().await else {
        return shutting_down();
    };
    let _guard = state.shutdown.invocation_guard();
    let deadline = Deadline::after(state.timeouts.task_change);

    match state.cluster.handle(&event, deadline).await {
        Ok(ClusterOutcome::Ignored(reason)) => ignored(&reason),
        Ok(ClusterOutcome::FannedOut(report)) => {
            (StatusCode::OK, Json(fan_out_json(&report))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn lifecycle_handler(
    State(state): State<EventState>,
    Json(event): Json<LifecycleEvent>,
) -> Response {
    if state.shutdown.is_shutdown() {
        return shutting_down();
    }

    let Ok(_permit) = state.lifecycle_slot.clone().acquire_owned().await else {
        return shutting_down();
    };
    let _guard = state.shutdown.invocation_guard();
    let timeout = match event.transition() {
        LifecycleTransition::Launching => state.timeouts.launch,
        _ => state.timeouts.terminate,
    };
    let deadline = Deadline::after(timeout);

    match state.lifecycle.handle(&event, deadline).await {
        Ok(LifecycleOutcome::Ignored(reason)) => ignored(&reason),
        Ok(LifecycleOutcome::Admitted { instance_id, report }) => (
            StatusCode::OK,
            Json(json!({
                "outcome": "admitted",
                "instanceId": instance_id,
                "publish": publish_json(&report),
            })),
        )
            .into_response(),
        Ok(LifecycleOutcome::Evicted { instance_id, report }) => (
            StatusCode::OK,
            Json(json!({
                "outcome": "evicted",
                "instanceId": instance_id,
                "publish": publish_json(&report),
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

fn ignored(reason: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "outcome": "ignored", "reason": reason })),
    )
        .into_response()
}

fn shutting_down() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "shutting down" })),
    )
        .into_response()
}

fn error_response(e: NlbError) -> Response {
    tracing::error!("invocation failed: {}", e);
    let status = match &e {
        NlbError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        NlbError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

fn fan_out_json(report: &FanOutReport) -> Value {
    let nodes: Vec<Value> = report
        .nodes
        .iter()
        .map(|n| {
            let outcome = match &n.outcome {
                NodeOutcome::Finished(status) => json!({ "status": status }),
                NodeOutcome::Failed(reason) => json!({ "error": reason }),
                NodeOutcome::DeadlineExceeded => json!({ "error": "deadline exceeded" }),
            };
            json!({ "nodeId": n.node_id, "outcome": outcome })
        })
        .collect();

    json!({
        "outcome": "fanned-out",
        "jobId": report.job_id,
        "succeeded": report.all_succeeded(),
        "nodes": nodes,
    })
}

fn publish_json(report: &PublishReport) -> Value {
    json!({
        "published": report.published.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
        "skipped": report.skipped.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
        "aliases": report.aliases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NodeCommandResult;
    use crate::domain::value_objects::{FleetRecord, InvocationStatus};

    #[test]
    fn test_event_timeouts_default() {
        let timeouts = EventTimeouts::default();
        assert_eq!(timeouts.task_change, Duration::from_secs(60));
        assert_eq!(timeouts.launch, Duration::from_secs(180));
        assert_eq!(timeouts.terminate, Duration::from_secs(30));
    }

    #[test]
    fn test_fan_out_json_reports_each_node() {
        let report = FanOutReport {
            job_id: Some("job-1".to_string()),
            nodes: vec![
                NodeCommandResult {
                    node_id: "i-1".to_string(),
                    outcome: NodeOutcome::Finished(InvocationStatus::Success),
                },
                NodeCommandResult {
                    node_id: "i-2".to_string(),
                    outcome: NodeOutcome::DeadlineExceeded,
                },
            ],
        };

        let json = fan_out_json(&report);
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["succeeded"], false);
        assert_eq!(json["nodes"][0]["outcome"]["status"], "Success");
        assert_eq!(json["nodes"][1]["outcome"]["error"], "deadline exceeded");
    }

    #[test]
    fn test_publish_json_lists_records() {
        let report = PublishReport {
            published: vec![FleetRecord::PublicV4],
            skipped: vec![FleetRecord::PublicV6],
            aliases: 2,
        };

        let json = publish_json(&report);
        assert_eq!(json["published"][0], "public-v4");
        assert_eq!(json["skipped"][0], "public-v6");
        assert_eq!(json["aliases"], 2);
    }

    #[test]
    fn test_deadline_error_maps_to_gateway_timeout() {
        let response = error_response(NlbError::DeadlineExceeded("waiting".to_string()));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
