//! Handlers for the `/jobs` resource.
//!
//! All endpoints require authentication via [`AuthUser`]. Jobs are shared
//! across users; the caller is recorded in logs only.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bigshot_core::job_type::JobType;
use bigshot_core::types::DbId;
use bigshot_core::work::{TaskPayload, DEFAULT_CLEANUP_DAYS};
use bigshot_db::models::job::JobListQuery;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/jobs`.
///
/// Only `domain_enumeration` reads `domains`, `sources` and `options`;
/// only `data_cleanup` reads `days_old`.
#[derive(Debug, Deserialize, Validate)]
pub struct StartJobRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    #[validate(length(max = 100, message = "At most 100 domains per job"))]
    pub domains: Vec<String>,
    #[serde(default = "default_sources")]
    #[validate(length(min = 1, message = "At least one source is required"))]
    pub sources: Vec<String>,
    #[serde(default)]
    pub options: serde_json::Value,
    #[serde(default = "default_days_old")]
    #[validate(range(min = 1, max = 3650))]
    pub days_old: u32,
}

fn default_sources() -> Vec<String> {
    vec![bigshot_worker::sources::CRTSH.to_string()]
}

fn default_days_old() -> u32 {
    DEFAULT_CLEANUP_DAYS
}

impl StartJobRequest {
    /// The task payload this request describes. Domains are trimmed and
    /// lower-cased; full validation happens in the dispatcher.
    pub fn into_payload(self) -> TaskPayload {
        match self.job_type {
            JobType::DomainEnumeration => TaskPayload::DomainEnumeration {
                targets: self
                    .domains
                    .iter()
                    .map(|d| d.trim().to_lowercase())
                    .filter(|d| !d.is_empty())
                    .collect(),
                sources: self.sources,
                options: self.options,
            },
            JobType::DataNormalization => TaskPayload::DataNormalization,
            JobType::DataDeduplication => TaskPayload::DataDeduplication,
            JobType::DataCleanup => TaskPayload::DataCleanup {
                days_old: self.days_old,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create a job and queue its task. Returns 202 with the `pending` job;
/// a queue failure returns 503 and leaves the job `failed`.
pub async fn start_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<StartJobRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let job = state.dispatcher.dispatch(input.into_payload()).await?;

    tracing::info!(
        job_id = job.id,
        job_type = %job.job_type,
        user_id = auth.user_id,
        "Job started",
    );

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// Supports `status`, `type`, `target`, `page` and `per_page` query
/// parameters. Newest first.
pub async fn list_jobs(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state.query.list(&params).await?;
    Ok(Json(DataResponse { data: page }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.query.get_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs/{id}/status
///
/// The job plus live task state (omitted if the queue cannot be reached)
/// and an estimated completion time.
pub async fn job_status(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let view = state.query.status(job_id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// GET /api/v1/jobs/{id}/task-status
pub async fn task_status(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let view = state.query.task_status(job_id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// GET /api/v1/jobs/{id}/logs
pub async fn job_logs(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let logs = state.query.logs(job_id).await?;
    Ok(Json(DataResponse { data: logs }))
}

/// GET /api/v1/jobs/{id}/results
///
/// 409 unless the job has completed.
pub async fn job_results(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let results = state.query.results(job_id).await?;
    Ok(Json(DataResponse { data: results }))
}

/// GET /api/v1/jobs/stats
pub async fn job_stats(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let stats = state.query.stats().await?;
    Ok(Json(DataResponse { data: stats }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a pending or running job and revoke its task. Returns the
/// cancelled job; 409 if the job already finished.
pub async fn cancel_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.cancellation.cancel(job_id).await?;

    tracing::info!(job_id, user_id = auth.user_id, "Job cancelled");

    Ok(Json(DataResponse { data: job }))
}
