//! Node Agent API
//!
//! Runs on every proxy node. Serves the health endpoint the scaling
//! lifecycle reconciler gates admission on, and receives remote rebuild
//! commands from the cluster-change reconciler.

use crate::application::BackendDirectoryService;
use crate::domain::entities::RemoteCommand;
use crate::domain::value_objects::InvocationStatus;
use crate::infrastructure::ShutdownController;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

/// Finished jobs are pruned once the store grows past this.
const MAX_TRACKED_JOBS: usize = 1024;

/// Command submission from the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub job_id: String,
    pub command: RemoteCommand,
}

/// Status of one job on this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandStatus {
    pub job_id: String,
    pub status: InvocationStatus,
}

/// Agent state shared by the handlers.
#[derive(Clone)]
pub struct AgentState {
    directory: Arc<BackendDirectoryService>,
    /// Set once a configuration has been installed
    ready: Arc<AtomicBool>,
    jobs: Arc<DashMap<String, InvocationStatus>>,
    /// One rebuild at a time on a node
    rebuild_lock: Arc<Mutex<()>>,
}

impl AgentState {
    pub fn new(directory: Arc<BackendDirectoryService>) -> Self {
        Self {
            directory,
            ready: Arc::new(AtomicBool::new(false)),
            jobs: Arc::new(DashMap::new()),
            rebuild_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn job_status(&self, job_id: &str) -> Option<InvocationStatus> {
        self.jobs.get(job_id).map(|s| *s)
    }

    /// Rebuild the local configuration. Marks the node ready on success.
    pub async fn rebuild(&self) -> bool {
        let _guard = self.rebuild_lock.lock().await;
        match self.directory.rebuild().await {
            Ok(outcome) => {
                tracing::info!(?outcome, "rebuild complete");
                self.ready.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                tracing::error!("rebuild failed, keeping previous configuration: {}", e);
                false
            }
        }
    }

    /// Register a job and run it in the background.
    ///
    /// Resubmitting a known job id returns its current status.
    pub fn submit(&self, request: CommandRequest) -> (bool, InvocationStatus) {
        match self.jobs.entry(request.job_id.clone()) {
            Entry::Occupied(existing) => return (false, *existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(InvocationStatus::Pending);
            }
        }
        self.prune_finished();

        let state = self.clone();
        tokio::spawn(async move {
            state.jobs.insert(request.job_id.clone(), InvocationStatus::InProgress);
            let succeeded = match request.command {
                RemoteCommand::Rebuild => state.rebuild().await,
            };
            let status = if succeeded {
                InvocationStatus::Success
            } else {
                InvocationStatus::Failed
            };
            tracing::info!(job = %request.job_id, ?status, "command finished");
            state.jobs.insert(request.job_id, status);
        });

        (true, InvocationStatus::Pending)
    }

    fn prune_finished(&self) {
        if self.jobs.len() >= MAX_TRACKED_JOBS {
            self.jobs.retain(|_, status| !status.is_terminal());
        }
    }
}

/// HTTP server for the node agent.
pub struct AgentApi {
    listen_addr: String,
    state: AgentState,
}

impl AgentApi {
    pub fn new(listen_addr: String, state: AgentState) -> Self {
        Self { listen_addr, state }
    }

    pub fn state(&self) -> AgentState {
        self.state.clone()
    }

    pub fn router(state: AgentState) -> Router {
        Router::new()
            .route("/healthz", get(health_handler))
            .route("/api/v1/commands", post(submit_handler))
            .route("/api/v1/commands/:job_id", get(status_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve until shutdown is signalled.
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let app = Self::router(self.state.clone());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("agent API listening on {}", self.listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        Ok(())
    }
}

// Handler functions

async fn health_handler(State(state): State<AgentState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "starting" })),
        )
    }
}

async fn submit_handler(
    State(state): State<AgentState>,
    Json(request): Json<CommandRequest>,
) -> impl IntoResponse {
    let job_id = request.job_id.clone();
    tracing::info!(job = %job_id, command = ?request.command, "command received");

    let (accepted, status) = state.submit(request);
    let code = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (code, Json(CommandStatus { job_id, status }))
}

async fn status_handler(
    State(state): State<AgentState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.job_status(&job_id) {
        Some(status) => (StatusCode::OK, Json(CommandStatus { job_id, status })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "jobId": job_id,
                "error": "job not found"
            })),
        )
            .into_response(),
    }
}
