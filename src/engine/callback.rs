//! Inbound provider callbacks.

use crate::error::{Error, Result};
use crate::provider::{MISSING_RESULT_URL, RemoteStatus, UNKNOWN_PROVIDER_ERROR};
use crate::types::{JobId, JobKind, Outcome};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::JobEngine;

/// What the engine did with a callback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CallbackAck {
    /// The callback finalized the job
    Finalized {
        /// Job the callback belonged to
        job_id: JobId,
    },
    /// Progress notification; nothing to do yet
    Ignored {
        /// Job the callback belonged to
        job_id: JobId,
    },
    /// The job was already terminal or being finalized
    Duplicate {
        /// Job the callback belonged to
        job_id: JobId,
    },
    /// Arrived while the job's submission was still in flight; a terminal status is
    /// applied once the provider task id is recorded
    Deferred {
        /// Provider task id named by the callback
        external_task_id: String,
    },
}

impl JobEngine {
    /// Handle a provider callback for a callback-based kind
    ///
    /// The body is parsed by the kind's provider and matched to a job by its external
    /// task id. Terminal statuses are finalized inline on the calling task; the first
    /// result URL is used when several are present. Safe to call any number of times
    /// for the same job.
    ///
    /// # Errors
    ///
    /// Fails when no provider serves `kind`, the provider does not use callbacks, the
    /// body cannot be parsed, or no job carries the external task id and no submission
    /// of the kind is in flight.
    pub async fn handle_callback(
        &self,
        kind: JobKind,
        body: &serde_json::Value,
    ) -> Result<CallbackAck> {
        let provider = self.providers.get(kind)?;
        let payload = provider.parse_callback(body)?;

        let outcome = match payload.status {
            RemoteStatus::Pending => None,
            RemoteStatus::Completed => Some(match payload.result_urls.into_iter().next() {
                Some(download_url) => Outcome::Succeeded { download_url },
                None => Outcome::failed(MISSING_RESULT_URL),
            }),
            RemoteStatus::Failed => Some(Outcome::failed(
                payload.error.unwrap_or_else(|| UNKNOWN_PROVIDER_ERROR.into()),
            )),
        };

        let Some(record) = self
            .store
            .find_by_external_id(kind, &payload.external_task_id)
            .await?
        else {
            return self
                .defer_callback(kind, payload.external_task_id, outcome)
                .await;
        };
        let job_id = record.id;

        tracing::debug!(
            job_id = job_id.0,
            kind = %kind,
            external_task_id = %payload.external_task_id,
            status = ?payload.status,
            "Callback received"
        );

        match outcome {
            None => Ok(CallbackAck::Ignored { job_id }),
            Some(outcome) => Ok(self.finalize_from_callback(job_id, outcome).await),
        }
    }

    /// Callback for a task id no job carries yet
    ///
    /// While a submission of the kind is in flight the provider may answer before its
    /// task id is stored. Terminal outcomes are held for the submission to pick up;
    /// otherwise the task id is unknown.
    async fn defer_callback(
        &self,
        kind: JobKind,
        external_task_id: String,
        outcome: Option<Outcome>,
    ) -> Result<CallbackAck> {
        let Some(outcome) = outcome else {
            return if self.registry.is_submitting(kind) {
                Ok(CallbackAck::Deferred { external_task_id })
            } else {
                Err(unknown_task(kind, &external_task_id))
            };
        };
        if !self
            .registry
            .hold_early_callback(kind, &external_task_id, outcome)
        {
            return Err(unknown_task(kind, &external_task_id));
        }

        // submit may have stored the task id after our lookup but before the hold
        if let Some(record) = self
            .store
            .find_by_external_id(kind, &external_task_id)
            .await?
            && let Some(outcome) = self.registry.take_early_callback(kind, &external_task_id)
        {
            return Ok(self.finalize_from_callback(record.id, outcome).await);
        }

        tracing::info!(
            kind = %kind,
            external_task_id = %external_task_id,
            "Callback arrived before submission completed, holding it"
        );
        Ok(CallbackAck::Deferred { external_task_id })
    }

    async fn finalize_from_callback(&self, job_id: JobId, outcome: Outcome) -> CallbackAck {
        if self.finalize(job_id, outcome).await {
            CallbackAck::Finalized { job_id }
        } else {
            CallbackAck::Duplicate { job_id }
        }
    }
}

fn unknown_task(kind: JobKind, external_task_id: &str) -> Error {
    Error::NotFound(format!("{kind} job for external task {external_task_id}"))
}
