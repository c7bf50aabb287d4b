//! The single idempotent completion path.
//!
//! Every terminal outcome after submission goes through [`JobEngine::finalize`]:
//! poll loops, callbacks and timeouts alike. The terminal write is conditional on the
//! job still being PROCESSING, which is what makes duplicate callbacks, poll/callback
//! races and late results after a cancel harmless.

use crate::config::WebhookEvent;
use crate::db::{JobRecord, TerminalUpdate};
use crate::error::Result;
use crate::types::{Event, JobId, JobReport, JobStatus, Outcome, now_millis};
use crate::workspace::JobWorkspace;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

use super::JobEngine;

/// Failure recorded when finalization itself breaks
pub const UNEXPECTED_FINALIZE_ERROR: &str = "Unexpected error while finalizing job";

impl JobEngine {
    /// Convert a provider outcome into the job's terminal state
    ///
    /// Returns `true` when this call wrote the terminal state. A job that is already
    /// terminal, or whose finalization is running concurrently, is left untouched and
    /// `false` is returned. Errors never escape: anything unexpected (including a panic)
    /// fails the job with a generic message. The job's workspace is removed and its
    /// handle released on every path.
    pub async fn finalize(&self, id: JobId, outcome: Outcome) -> bool {
        let Some(_claim) = self.registry.try_claim_finalize(id) else {
            tracing::debug!(job_id = id.0, "Finalize already in progress, skipping");
            return false;
        };

        let report = match AssertUnwindSafe(self.finalize_claimed(id, outcome))
            .catch_unwind()
            .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!(job_id = id.0, error = %e, "Finalize failed");
                self.fail_unexpected(id).await
            }
            Err(_) => {
                tracing::error!(job_id = id.0, "Finalize panicked");
                self.fail_unexpected(id).await
            }
        };

        self.registry.remove(id);

        report.is_some()
    }

    /// Finalize body; `Some` when the terminal write was applied
    async fn finalize_claimed(&self, id: JobId, outcome: Outcome) -> Result<Option<JobReport>> {
        let Some(record) = self.store.get_job(id).await? else {
            tracing::warn!(job_id = id.0, "Finalize for unknown job ignored");
            return Ok(None);
        };
        if record.status != JobStatus::Processing {
            self.discard_late_result(&record, None).await;
            return Ok(None);
        }

        let workspace = JobWorkspace::create(self.config.temp_dir(), id).await?;

        let (update, stored_ref) = match outcome {
            Outcome::Succeeded { download_url } => {
                self.fetch_and_store(&record, &download_url, &workspace)
                    .await?
            }
            Outcome::Failed { error } => (
                TerminalUpdate::failed(error, record.created_at, now_millis()),
                None,
            ),
        };

        let applied = match self
            .store
            .finish_job(id, JobStatus::Processing, &update)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                self.remove_stored(stored_ref.as_deref()).await;
                return Err(e);
            }
        };
        workspace.close().await;

        if !applied {
            self.discard_late_result(&record, stored_ref.as_deref()).await;
            return Ok(None);
        }

        let report = JobReport {
            id,
            kind: record.kind,
            status: update.status,
            result_url: update.result_ref.as_deref().map(|r| self.artifacts.url(r)),
            error_message: update.error_message.clone(),
            processing_time_ms: Some(update.processing_time_ms),
        };
        self.announce(&report);

        Ok(Some(report))
    }

    /// Download the result and persist it; a failed download becomes a FAILED update
    async fn fetch_and_store(
        &self,
        record: &JobRecord,
        download_url: &str,
        workspace: &JobWorkspace,
    ) -> Result<(TerminalUpdate, Option<String>)> {
        let provider = self.providers.get(record.kind)?;
        let staged = workspace.file(&format!("result.{}", record.kind.result_extension()));

        match self
            .fetcher
            .download(download_url, &provider.download_headers(), &staged)
            .await
        {
            Ok(file) => {
                tracing::debug!(job_id = record.id.0, size = file.size, "Result downloaded");
                let reference = self.artifacts.put(record.id, record.kind, &file.path).await?;
                Ok((
                    TerminalUpdate::completed(reference.clone(), record.created_at, now_millis()),
                    Some(reference),
                ))
            }
            Err(failed) => {
                tracing::warn!(
                    job_id = record.id.0,
                    url = download_url,
                    error = %failed,
                    "Result download failed"
                );
                Ok((
                    TerminalUpdate::failed(failed.to_string(), record.created_at, now_millis()),
                    None,
                ))
            }
        }
    }

    /// Fail a PROCESSING job after finalization broke
    async fn fail_unexpected(&self, id: JobId) -> Option<JobReport> {
        let record = match self.store.get_job(id).await {
            Ok(Some(record)) if record.status == JobStatus::Processing => record,
            Ok(_) => return None,
            Err(e) => {
                tracing::error!(job_id = id.0, error = %e, "Cannot load job to record failure");
                return None;
            }
        };

        let update =
            TerminalUpdate::failed(UNEXPECTED_FINALIZE_ERROR, record.created_at, now_millis());
        match self
            .store
            .finish_job(id, JobStatus::Processing, &update)
            .await
        {
            Ok(true) => {
                let report = JobReport {
                    id,
                    kind: record.kind,
                    status: JobStatus::Failed,
                    result_url: None,
                    error_message: update.error_message,
                    processing_time_ms: Some(update.processing_time_ms),
                };
                self.announce(&report);
                Some(report)
            }
            Ok(false) => None,
            Err(e) => {
                tracing::error!(job_id = id.0, error = %e, "Failed to record finalize failure");
                None
            }
        }
    }

    /// Drop an outcome that arrived after the job left PROCESSING
    async fn discard_late_result(&self, record: &JobRecord, stored_ref: Option<&str>) {
        self.remove_stored(stored_ref).await;

        let status = match self.store.get_job(record.id).await {
            Ok(Some(current)) => current.status,
            _ => record.status,
        };
        tracing::warn!(job_id = record.id.0, status = %status, "Discarding late result");
        self.emit_event(Event::LateResultDiscarded {
            id: record.id,
            status,
        });
    }

    async fn remove_stored(&self, stored_ref: Option<&str>) {
        let Some(reference) = stored_ref else {
            return;
        };
        if let Err(e) = self.artifacts.remove(reference).await {
            tracing::warn!(reference, error = %e, "Failed to remove discarded artifact");
        }
    }

    /// Log, emit and notify a terminal transition
    pub(crate) fn announce(&self, report: &JobReport) {
        match report.status {
            JobStatus::Completed => {
                let result_url = report.result_url.clone().unwrap_or_default();
                tracing::info!(job_id = report.id.0, kind = %report.kind, result_url = %result_url, "Job completed");
                self.emit_event(Event::JobCompleted {
                    id: report.id,
                    kind: report.kind,
                    result_url,
                });
                self.notify(WebhookEvent::OnComplete, report);
            }
            JobStatus::Failed => {
                let error = report.error_message.clone().unwrap_or_default();
                tracing::info!(job_id = report.id.0, kind = %report.kind, error = %error, "Job failed");
                self.emit_event(Event::JobFailed {
                    id: report.id,
                    kind: report.kind,
                    error,
                });
                self.notify(WebhookEvent::OnFailed, report);
            }
            JobStatus::Cancelled => {
                tracing::info!(job_id = report.id.0, kind = %report.kind, "Job cancelled");
                self.emit_event(Event::JobCancelled { id: report.id });
                self.notify(WebhookEvent::OnCancelled, report);
            }
            JobStatus::Draft | JobStatus::Processing => {}
        }
    }
}
