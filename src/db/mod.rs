//! Database layer for genjob
//!
//! Handles SQLite persistence for job records. The engine only talks to storage
//! through the narrow [`JobStore`] trait; [`Database`] is the bundled implementation.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`jobs`] — Job record CRUD and conditional status transitions

use crate::error::{DatabaseError, Error, Result};
use crate::types::{JobId, JobInfo, JobKind, JobReport, JobStatus};
use async_trait::async_trait;
use sqlx::{FromRow, sqlite::SqlitePool};

mod jobs;
mod migrations;

/// New job to be inserted into the database (always as DRAFT)
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Job kind
    pub kind: JobKind,
    /// Ordered input references
    pub input_refs: Vec<String>,
    /// Submitting user
    pub owner: Option<String>,
    /// Optional label
    pub title: Option<String>,
}

/// Job record as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Unique database ID
    pub id: JobId,
    /// Job kind
    pub kind: JobKind,
    /// Current status
    pub status: JobStatus,
    /// Provider task id, set once submission succeeds
    pub external_task_id: Option<String>,
    /// Ordered input references
    pub input_refs: Vec<String>,
    /// Stored result reference (COMPLETED only)
    pub result_ref: Option<String>,
    /// Failure reason (FAILED only)
    pub error_message: Option<String>,
    /// Submitting user
    pub owner: Option<String>,
    /// Optional label
    pub title: Option<String>,
    /// Unix milliseconds at creation
    pub created_at: i64,
    /// Unix milliseconds at the terminal transition
    pub completed_at: Option<i64>,
    /// `completed_at - created_at`
    pub processing_time_ms: Option<i64>,
}

impl JobRecord {
    /// Caller-facing view, resolving the result reference to a URL
    pub fn report(&self, result_url: impl FnOnce(&str) -> String) -> JobReport {
        JobReport {
            id: self.id,
            kind: self.kind,
            status: self.status,
            result_url: self.result_ref.as_deref().map(result_url),
            error_message: self.error_message.clone(),
            processing_time_ms: self.processing_time_ms,
        }
    }

    /// Listing view, resolving the result reference to a URL
    pub fn info(&self, result_url: impl FnOnce(&str) -> String) -> JobInfo {
        JobInfo {
            id: self.id,
            kind: self.kind,
            status: self.status,
            owner: self.owner.clone(),
            title: self.title.clone(),
            inputs: self.input_refs.clone(),
            result_url: self.result_ref.as_deref().map(result_url),
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            processing_time_ms: self.processing_time_ms,
        }
    }
}

/// Raw job row from SQLite
#[derive(Debug, Clone, FromRow)]
pub(crate) struct JobRow {
    pub id: i64,
    pub kind: String,
    pub status: i32,
    pub external_task_id: Option<String>,
    pub input_refs: String,
    pub result_ref: Option<String>,
    pub error_message: Option<String>,
    pub owner: Option<String>,
    pub title: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub processing_time_ms: Option<i64>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let kind = row.kind.parse::<JobKind>().map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Corrupt job {}: {}",
                row.id, e
            )))
        })?;
        let input_refs: Vec<String> = serde_json::from_str(&row.input_refs).map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Corrupt input refs on job {}: {}",
                row.id, e
            )))
        })?;

        Ok(JobRecord {
            id: JobId(row.id),
            kind,
            status: JobStatus::from_i32(row.status),
            external_task_id: row.external_task_id,
            input_refs,
            result_ref: row.result_ref,
            error_message: row.error_message,
            owner: row.owner,
            title: row.title,
            created_at: row.created_at,
            completed_at: row.completed_at,
            processing_time_ms: row.processing_time_ms,
        })
    }
}

/// The single write that moves a job into a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalUpdate {
    /// Target status (COMPLETED, FAILED or CANCELLED)
    pub status: JobStatus,
    /// Stored result reference, set only for COMPLETED
    pub result_ref: Option<String>,
    /// Failure reason, set only for FAILED
    pub error_message: Option<String>,
    /// Unix milliseconds of the transition
    pub completed_at: i64,
    /// `completed_at - created_at`
    pub processing_time_ms: i64,
}

impl TerminalUpdate {
    fn at(status: JobStatus, created_at: i64, completed_at: i64) -> Self {
        Self {
            status,
            result_ref: None,
            error_message: None,
            completed_at,
            processing_time_ms: (completed_at - created_at).max(0),
        }
    }

    /// COMPLETED with a stored result
    pub fn completed(result_ref: impl Into<String>, created_at: i64, completed_at: i64) -> Self {
        Self {
            result_ref: Some(result_ref.into()),
            ..Self::at(JobStatus::Completed, created_at, completed_at)
        }
    }

    /// FAILED with a reason
    pub fn failed(error: impl Into<String>, created_at: i64, completed_at: i64) -> Self {
        Self {
            error_message: Some(error.into()),
            ..Self::at(JobStatus::Failed, created_at, completed_at)
        }
    }

    /// CANCELLED, carrying neither result nor error
    pub fn cancelled(created_at: i64, completed_at: i64) -> Self {
        Self::at(JobStatus::Cancelled, created_at, completed_at)
    }
}

/// Filter for [`JobStore::list_jobs`]; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Only jobs of this user
    pub owner: Option<String>,
    /// Only jobs of this kind
    pub kind: Option<JobKind>,
    /// Only jobs in this status
    pub status: Option<JobStatus>,
}

/// Durable job record storage used by the engine
///
/// Every status change is conditional on the status the caller expects the job to be
/// in, so concurrent writers cannot move a job out of a terminal state.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a DRAFT record
    async fn insert_job(&self, job: &NewJob) -> Result<JobId>;

    /// Load a record
    async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>>;

    /// Load the record a provider task belongs to
    async fn find_by_external_id(
        &self,
        kind: JobKind,
        external_task_id: &str,
    ) -> Result<Option<JobRecord>>;

    /// DRAFT -> PROCESSING, recording the provider task id; `false` if not applied
    async fn mark_processing(&self, id: JobId, external_task_id: &str) -> Result<bool>;

    /// `from` -> terminal; `false` if the job was no longer in `from`
    async fn finish_job(&self, id: JobId, from: JobStatus, update: &TerminalUpdate)
    -> Result<bool>;

    /// Records matching a filter, newest first
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobRecord>>;

    /// Delete a record; `false` if it did not exist
    async fn delete_job(&self, id: JobId) -> Result<bool>;
}

/// Database handle for genjob
pub struct Database {
    pool: SqlitePool,
}

#[async_trait]
impl JobStore for Database {
    async fn insert_job(&self, job: &NewJob) -> Result<JobId> {
        Database::insert_job(self, job).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        Database::get_job(self, id).await
    }

    async fn find_by_external_id(
        &self,
        kind: JobKind,
        external_task_id: &str,
    ) -> Result<Option<JobRecord>> {
        Database::find_by_external_id(self, kind, external_task_id).await
    }

    async fn mark_processing(&self, id: JobId, external_task_id: &str) -> Result<bool> {
        Database::mark_processing(self, id, external_task_id).await
    }

    async fn finish_job(
        &self,
        id: JobId,
        from: JobStatus,
        update: &TerminalUpdate,
    ) -> Result<bool> {
        Database::finish_job(self, id, from, update).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobRecord>> {
        Database::list_jobs(self, filter).await
    }

    async fn delete_job(&self, id: JobId) -> Result<bool> {
        Database::delete_job(self, id).await
    }
}
