//! Status queries, cancellation, listing and deletion.

use crate::db::{JobFilter, JobRecord, TerminalUpdate};
use crate::error::{JobError, Result};
use crate::types::{JobId, JobInfo, JobReport, JobStatus, now_millis};
use crate::workspace::JobWorkspace;

use super::JobEngine;

impl JobEngine {
    /// Current status of a job
    ///
    /// A tracked job reports PROCESSING. Finalize and cancel drop the handle once the
    /// job is terminal, so everything else comes from the stored record and jobs
    /// survive registry removal and restarts.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for ids that were never created (or were deleted).
    pub async fn get_status(&self, id: JobId) -> Result<JobReport> {
        if let Some(handle) = self.registry.lookup(id) {
            return Ok(JobReport::processing(id, handle.kind()));
        }

        let record = self.load(id).await?;
        Ok(record.report(|r| self.artifacts.url(r)))
    }

    /// Cancel a job locally
    ///
    /// Stops the job's poll loop and marks it CANCELLED. The provider is not told and
    /// may still finish; its late result is discarded. Cancelling a job that is already
    /// terminal is a no-op, so calling this twice is safe.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] for unknown ids and [`JobError::InvalidState`] for a
    /// job whose submission is still in progress.
    pub async fn cancel(&self, id: JobId) -> Result<JobReport> {
        let record = self.load(id).await?;
        if record.status == JobStatus::Draft {
            return Err(JobError::InvalidState {
                id: id.0,
                operation: "cancel".into(),
                current_state: record.status.to_string(),
            }
            .into());
        }

        if let Some(handle) = self.registry.remove(id) {
            handle.cancel();
        }
        if record.status.is_terminal() {
            tracing::debug!(job_id = id.0, status = %record.status, "Cancel of terminal job ignored");
            return Ok(record.report(|r| self.artifacts.url(r)));
        }

        let update = TerminalUpdate::cancelled(record.created_at, now_millis());
        if !self
            .store
            .finish_job(id, JobStatus::Processing, &update)
            .await?
        {
            // finalize got there first
            let current = self.load(id).await?;
            return Ok(current.report(|r| self.artifacts.url(r)));
        }

        let report = JobReport {
            id,
            kind: record.kind,
            status: JobStatus::Cancelled,
            result_url: None,
            error_message: None,
            processing_time_ms: Some(update.processing_time_ms),
        };
        self.announce(&report);

        Ok(report)
    }

    /// Full details of one job
    pub async fn get_job(&self, id: JobId) -> Result<JobInfo> {
        let record = self.load(id).await?;
        Ok(record.info(|r| self.artifacts.url(r)))
    }

    /// Jobs matching a filter, newest first
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobInfo>> {
        let records = self.store.list_jobs(filter).await?;
        Ok(records
            .iter()
            .map(|record| record.info(|r| self.artifacts.url(r)))
            .collect())
    }

    /// Delete a terminal job together with its stored result
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidState`] while the job is DRAFT or PROCESSING.
    pub async fn delete_job(&self, id: JobId) -> Result<()> {
        let record = self.load(id).await?;
        if !record.status.is_terminal() {
            return Err(JobError::InvalidState {
                id: id.0,
                operation: "delete".into(),
                current_state: record.status.to_string(),
            }
            .into());
        }

        if let Some(reference) = &record.result_ref
            && let Err(e) = self.artifacts.remove(reference).await
        {
            tracing::warn!(job_id = id.0, reference = %reference, error = %e, "Failed to remove result artifact");
        }
        JobWorkspace::discard(self.config.temp_dir(), id).await;
        self.registry.remove(id);

        if !self.store.delete_job(id).await? {
            return Err(JobError::NotFound { id: id.0 }.into());
        }
        tracing::info!(job_id = id.0, "Job deleted");
        Ok(())
    }

    async fn load(&self, id: JobId) -> Result<JobRecord> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| JobError::NotFound { id: id.0 }.into())
    }
}
