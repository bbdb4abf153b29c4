//! HTTP job service
//!
//! Investigations run on spawned tasks; their progress and results live in a
//! [`JobRegistry`] owned by the router state.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::Error;
use crate::evidence::Conclusion;
use crate::mission::{InvestigationFailure, InvestigationOutcome, InvestigationRequest, Investigator};
use crate::report::InvestigationReport;

const SERVICE_NAME: &str = "cluster-hunter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub report: Option<Box<InvestigationReport>>,
    pub failure: Option<InvestigationFailure>,
    cancel: CancellationToken,
    /// Completion order, for eviction
    finish_seq: Option<u64>,
}

impl JobRecord {
    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Investigation jobs by id
///
/// Running jobs are always kept. Once more than `retain_finished` jobs have
/// finished, the ones that finished first are dropped.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, JobRecord>,
    retain_finished: usize,
    finished: AtomicU64,
}

impl JobRegistry {
    pub fn new(retain_finished: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            retain_finished: retain_finished.max(1),
            finished: AtomicU64::new(0),
        }
    }

    /// Register a new job; `cancel` stops it at the next phase boundary
    pub fn insert(&self, cancel: CancellationToken) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.insert(
            id,
            JobRecord {
                status: JobStatus::Started,
                created_at: Utc::now(),
                finished_at: None,
                report: None,
                failure: None,
                cancel,
                finish_seq: None,
            },
        );
        id
    }

    pub fn mark_running(&self, id: &Uuid) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.status = JobStatus::Running;
        }
    }

    pub fn finish(&self, id: &Uuid, outcome: InvestigationOutcome) {
        {
            let Some(mut job) = self.jobs.get_mut(id) else {
                return;
            };
            job.finished_at = Some(Utc::now());
            job.finish_seq = Some(self.finished.fetch_add(1, Ordering::Relaxed));
            match outcome {
                Ok(report) => {
                    job.status = JobStatus::Completed;
                    job.report = Some(Box::new(report));
                }
                Err(failure) => {
                    job.status = JobStatus::Failed;
                    job.failure = Some(failure);
                }
            }
        }
        self.evict_finished();
    }

    fn evict_finished(&self) {
        let mut finished: Vec<(u64, Uuid)> = self
            .jobs
            .iter()
            .filter_map(|job| job.finish_seq.map(|seq| (seq, *job.key())))
            .collect();
        if finished.len() <= self.retain_finished {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - self.retain_finished;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
            debug!(investigation_id = %id, "Evicted finished job");
        }
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(id).map(|job| job.status)
    }

    pub fn get(&self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(id).map(|job| job.clone())
    }

    /// Signal cancellation to a job. Returns its status at the time of the
    /// request, `None` if the id is unknown. Finished jobs are left alone.
    pub fn cancel(&self, id: &Uuid) -> Option<JobStatus> {
        let job = self.jobs.get(id)?;
        if !job.is_finished() {
            job.cancel.cancel();
        }
        Some(job.status)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn active(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| !job.is_finished())
            .count()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub investigator: Investigator,
    pub registry: Arc<JobRegistry>,
    /// Parent of every job's cancellation token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(investigator: Investigator) -> Self {
        let retain_finished = investigator.config().server.retain_finished;
        Self {
            investigator,
            registry: Arc::new(JobRegistry::new(retain_finished)),
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvestigationResponse {
    pub investigation_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub success: bool,
    pub status: Option<JobStatus>,
    pub deployer_address: Option<String>,
    pub cluster_size: Option<usize>,
    pub evidence_count: Option<usize>,
    pub confidence_score: Option<f64>,
    pub conclusion: Option<Conclusion>,
    pub report: Option<Box<InvestigationReport>>,
    pub failure: Option<InvestigationFailure>,
    pub error: Option<String>,
}

impl From<JobRecord> for InvestigationResult {
    fn from(job: JobRecord) -> Self {
        match (job.status, job.report, job.failure) {
            (JobStatus::Completed, Some(report), _) => Self {
                success: true,
                status: Some(JobStatus::Completed),
                deployer_address: Some(report.deployer_address.to_string()),
                cluster_size: Some(report.cluster_size),
                evidence_count: Some(report.evidence_count),
                confidence_score: Some(report.confidence_score),
                conclusion: Some(report.conclusion),
                report: Some(report),
                ..Default::default()
            },
            (JobStatus::Failed, _, Some(failure)) => Self {
                status: Some(JobStatus::Failed),
                error: Some(failure.to_string()),
                failure: Some(failure),
                ..Default::default()
            },
            (status, _, _) => Self {
                status: Some(status),
                error: Some("Investigation still running".to_string()),
                ..Default::default()
            },
        }
    }
}

/// Error body for non-2xx responses
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match e {
            Error::InvestigationNotFound(_) => StatusCode::NOT_FOUND,
            ref e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| Error::InvestigationNotFound(raw.to_string()).into())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/investigate", post(start_investigation))
        .route("/investigate/:id", get(investigation_result))
        .route("/investigate/:id/status", get(investigation_status))
        .route("/investigate/:id/cancel", post(cancel_investigation))
        .with_state(state)
}

/// Serve until `state.shutdown` is cancelled
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind, e))?;
    info!(bind = %bind, "Investigation service listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Investigation service stopped");
    Ok(())
}

pub async fn start_investigation(
    State(state): State<AppState>,
    Json(request): Json<InvestigationRequest>,
) -> Json<InvestigationResponse> {
    let cancel = state.shutdown.child_token();
    let id = state.registry.insert(cancel.clone());

    info!(investigation_id = %id, "Investigation queued");

    let registry = state.registry.clone();
    let investigator = state.investigator.clone();
    tokio::spawn(async move {
        registry.mark_running(&id);
        let outcome = investigator.run(&request, &cancel).await;
        if let Err(failure) = &outcome {
            error!(investigation_id = %id, phase = %failure.phase, cause = %failure.cause, "Investigation failed");
        }
        registry.finish(&id, outcome);
    });

    Json(InvestigationResponse {
        investigation_id: id,
        status: JobStatus::Started,
        message: "Investigation started successfully".to_string(),
    })
}

pub async fn investigation_result(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<InvestigationResult>, ApiError> {
    let id = parse_id(&raw_id)?;
    let job = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::from(Error::InvestigationNotFound(raw_id)))?;
    Ok(Json(InvestigationResult::from(job)))
}

pub async fn investigation_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    let status = state
        .registry
        .status(&id)
        .ok_or_else(|| ApiError::from(Error::InvestigationNotFound(raw_id)))?;
    Ok(Json(json!({ "investigation_id": id, "status": status })))
}

pub async fn cancel_investigation(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    let status = state
        .registry
        .cancel(&id)
        .ok_or_else(|| ApiError::from(Error::InvestigationNotFound(raw_id)))?;
    let cancel_requested = matches!(status, JobStatus::Started | JobStatus::Running);
    if cancel_requested {
        info!(investigation_id = %id, "Investigation cancellation requested");
    }
    Ok(Json(json!({
        "investigation_id": id,
        "status": status,
        "cancel_requested": cancel_requested,
    })))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "jobs": state.registry.len(),
        "active_jobs": state.registry.active(),
    }))
}

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "description": "Wallet clustering and evidence correlation for Stacks forensics",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "start_investigation": "POST /investigate",
            "get_result": "GET /investigate/{investigation_id}",
            "get_status": "GET /investigate/{investigation_id}/status",
            "cancel": "POST /investigate/{investigation_id}/cancel",
            "health": "GET /health",
        }
    }))
}
