//! Job management handlers.

use super::{ListJobsQuery, SubmitJobRequest, SubmitJobResponse};
use crate::api::AppState;
use crate::db::JobFilter;
use crate::types::{JobId, JobRequest};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /jobs - Submit a job to its provider
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 201, description = "Job created; failed immediately if the provider refused it", body = SubmitJobResponse),
        (status = 400, description = "Inputs unusable for the job kind", body = crate::error::ApiError),
        (status = 501, description = "No provider configured for the job kind", body = crate::error::ApiError),
        (status = 503, description = "Engine is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobRequest>,
) -> Response {
    let request = JobRequest {
        kind: body.kind,
        inputs: body.inputs,
        owner: body.owner,
        title: body.title,
    };

    let id = match state.engine.submit(request).await {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    match state.engine.get_status(id).await {
        Ok(report) => (
            StatusCode::CREATED,
            Json(SubmitJobResponse {
                id,
                status: report.status,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs - List jobs, newest first
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "Matching jobs", body = Vec<crate::types::JobInfo>),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Response {
    let filter = JobFilter {
        owner: query.owner,
        kind: query.kind,
        status: query.status,
    };
    match state.engine.list_jobs(&filter).await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs/:id - Current status of a job
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job status", body = crate::types::JobReport),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.engine.get_status(JobId(id)).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /jobs/:id/cancel - Cancel a job locally
#[utoipa::path(
    post,
    path = "/jobs/{id}/cancel",
    tag = "jobs",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 202, description = "Job cancelled, or already terminal", body = crate::types::JobReport),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Submission still in progress", body = crate::error::ApiError)
    )
)]
pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.engine.cancel(JobId(id)).await {
        Ok(report) => (StatusCode::ACCEPTED, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /jobs/:id - Delete a terminal job and its stored result
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job is not terminal", body = crate::error::ApiError)
    )
)]
pub async fn delete_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.engine.delete_job(JobId(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
