//! Job record CRUD and conditional status transitions.

use crate::error::DatabaseError;
use crate::types::{JobId, JobKind, JobStatus, now_millis};
use crate::{Error, Result};
use sqlx::{QueryBuilder, Sqlite};

use super::{Database, JobFilter, JobRecord, JobRow, NewJob, TerminalUpdate};

const JOB_COLUMNS: &str = "id, kind, status, external_task_id, input_refs, result_ref, \
     error_message, owner, title, created_at, completed_at, processing_time_ms";

impl Database {
    /// Insert a new job as DRAFT
    pub async fn insert_job(&self, job: &NewJob) -> Result<JobId> {
        let input_refs = serde_json::to_string(&job.input_refs)?;

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (kind, status, input_refs, owner, title, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.kind.as_str())
        .bind(JobStatus::Draft.to_i32())
        .bind(&input_refs)
        .bind(&job.owner)
        .bind(&job.title)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert job: {}",
                e
            )))
        })?;

        Ok(JobId(result.last_insert_rowid()))
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get job: {}",
                e
            )))
        })?;

        row.map(JobRecord::try_from).transpose()
    }

    /// Find the job a provider task id belongs to
    pub async fn find_by_external_id(
        &self,
        kind: JobKind,
        external_task_id: &str,
    ) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE kind = ? AND external_task_id = ?"
        ))
        .bind(kind.as_str())
        .bind(external_task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find job by external id: {}",
                e
            )))
        })?;

        row.map(JobRecord::try_from).transpose()
    }

    /// Move a DRAFT job to PROCESSING and record its provider task id
    ///
    /// Returns `false` when the job is not a DRAFT without a task id.
    pub async fn mark_processing(&self, id: JobId, external_task_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, external_task_id = ?
            WHERE id = ? AND status = ? AND external_task_id IS NULL
            "#,
        )
        .bind(JobStatus::Processing.to_i32())
        .bind(external_task_id)
        .bind(id)
        .bind(JobStatus::Draft.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark job processing: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a terminal update if the job is still in `from`
    ///
    /// This is the only way a job reaches a terminal state. Returns `false` when another
    /// writer already moved the job on; the stored record is then left untouched.
    pub async fn finish_job(
        &self,
        id: JobId,
        from: JobStatus,
        update: &TerminalUpdate,
    ) -> Result<bool> {
        if !from.can_transition_to(update.status) {
            return Err(Error::Database(DatabaseError::QueryFailed(format!(
                "Illegal transition {} -> {} for job {}",
                from, update.status, id
            ))));
        }

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, result_ref = ?, error_message = ?,
                completed_at = ?, processing_time_ms = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(update.status.to_i32())
        .bind(&update.result_ref)
        .bind(&update.error_message)
        .bind(update.completed_at)
        .bind(update.processing_time_ms)
        .bind(id)
        .bind(from.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to finish job: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// List jobs matching a filter, newest first
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobRecord>> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1 = 1"));
        if let Some(owner) = &filter.owner {
            query.push(" AND owner = ").push_bind(owner.clone());
        }
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.to_i32());
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let rows = query
            .build_query_as::<JobRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list jobs: {}",
                    e
                )))
            })?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    /// Delete a job; returns `false` if it did not exist
    pub async fn delete_job(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete job: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
