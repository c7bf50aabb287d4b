//! Job creation and provider submission.

use crate::config::WebhookEvent;
use crate::db::{NewJob, TerminalUpdate};
use crate::error::{Error, JobError, ProviderError, Result};
use crate::provider::{CompletionProtocol, SubmitRequest};
use crate::registry::TaskHandle;
use crate::types::{Event, JobId, JobKind, JobReport, JobRequest, JobStatus, now_millis};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::JobEngine;

impl JobEngine {
    /// Submit a job to its provider
    ///
    /// Creates a DRAFT record and hands the inputs to the provider. When the provider
    /// rejects the job (or cannot be reached) the record is marked FAILED and the id is
    /// still returned; the job never becomes PROCESSING. On acceptance the job is
    /// PROCESSING and tracked before this returns, and poll-based kinds get a
    /// background poll loop. Remote completion is never awaited here.
    ///
    /// # Errors
    ///
    /// Fails without creating a record when the engine is shutting down, no provider
    /// serves the kind, or the provider refuses the input list.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let provider = self.providers.get(request.kind)?;
        provider.validate_inputs(&request.inputs)?;
        let submission = self.registry.begin_submission(request.kind);

        let id = self
            .store
            .insert_job(&NewJob {
                kind: request.kind,
                input_refs: request.inputs.clone(),
                owner: request.owner.clone(),
                title: request.title.clone(),
            })
            .await?;

        tracing::debug!(job_id = id.0, kind = %request.kind, "Job created, submitting to provider");

        let submitted = provider
            .submit(SubmitRequest {
                job_id: id,
                inputs: &request.inputs,
                title: request.title.as_deref(),
                store: self.artifacts.as_ref(),
            })
            .await;

        let external_task_id = match submitted {
            Ok(external_task_id) => external_task_id,
            Err(e) => {
                self.fail_submission(id, request.kind, e).await?;
                return Ok(id);
            }
        };

        // Tracked before PROCESSING becomes visible, so status and cancel never see a
        // processing job without a handle
        let handle = TaskHandle::new(id, request.kind, CancellationToken::new());
        let cancel = handle.cancellation_token();
        self.registry.register(handle)?;

        match self.store.mark_processing(id, &external_task_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.registry.remove(id);
                return Err(Error::Job(JobError::InvalidState {
                    id: id.0,
                    operation: "submit".into(),
                    current_state: "not draft".into(),
                }));
            }
            Err(e) => {
                self.registry.remove(id);
                tracing::error!(job_id = id.0, error = %e, "Failed to record provider task id");
                return Err(e);
            }
        }

        tracing::info!(
            job_id = id.0,
            kind = %request.kind,
            external_task_id = %external_task_id,
            "Job submitted"
        );
        self.emit_event(Event::JobSubmitted {
            id,
            kind: request.kind,
            external_task_id: external_task_id.clone(),
        });

        if provider.protocol() == CompletionProtocol::Poll {
            self.spawn_poll_loop(id, request.kind, external_task_id, cancel);
        } else if let Some(outcome) = self
            .registry
            .take_early_callback(request.kind, &external_task_id)
        {
            tracing::debug!(job_id = id.0, "Applying callback that arrived during submission");
            let engine = self.clone();
            self.tasks.spawn(async move {
                engine.finalize(id, outcome).await;
            });
        }
        drop(submission);

        Ok(id)
    }

    /// Record a rejected submission as FAILED
    async fn fail_submission(&self, id: JobId, kind: JobKind, error: ProviderError) -> Result<()> {
        let message = match &error {
            ProviderError::Rejected { message }
            | ProviderError::Unreachable { message }
            | ProviderError::InvalidResponse { message } => message.clone(),
            other => other.to_string(),
        };
        tracing::warn!(job_id = id.0, kind = %kind, error = %message, "Provider rejected job");

        let created_at = self
            .store
            .get_job(id)
            .await?
            .map(|record| record.created_at)
            .unwrap_or_else(now_millis);
        let update = TerminalUpdate::failed(message.clone(), created_at, now_millis());
        if !self.store.finish_job(id, JobStatus::Draft, &update).await? {
            return Ok(());
        }

        self.emit_event(Event::JobSubmissionFailed {
            id,
            kind,
            error: message.clone(),
        });
        self.notify(
            WebhookEvent::OnFailed,
            &JobReport {
                id,
                kind,
                status: JobStatus::Failed,
                result_url: None,
                error_message: Some(message),
                processing_time_ms: Some(update.processing_time_ms),
            },
        );
        Ok(())
    }
}
