//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] — Job submission, status, listing, cancellation, deletion
//! - [`callbacks`] — Inbound provider callbacks
//! - [`system`] — Health, events, OpenAPI

use crate::types::{JobId, JobKind, JobStatus};
use serde::{Deserialize, Serialize};

mod callbacks;
mod jobs;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use callbacks::*;
pub use jobs::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitJobRequest {
    /// Generation feature to run
    pub kind: JobKind,
    /// Ordered input references (uploaded file references or prompt text)
    pub inputs: Vec<String>,
    /// Submitting user
    #[serde(default)]
    pub owner: Option<String>,
    /// Optional label
    #[serde(default)]
    pub title: Option<String>,
}

/// Response for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitJobResponse {
    /// Id of the created job
    pub id: JobId,
    /// Status right after submission (processing, or failed when the provider refused)
    pub status: JobStatus,
}

/// Query parameters for GET /jobs
#[derive(Debug, Default, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListJobsQuery {
    /// Only jobs submitted by this user
    pub owner: Option<String>,
    /// Only jobs of this kind
    pub kind: Option<JobKind>,
    /// Only jobs in this status
    pub status: Option<JobStatus>,
}
