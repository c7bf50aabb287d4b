//! Startup restore and shutdown coordination.

use crate::db::{JobFilter, TerminalUpdate};
use crate::error::Result;
use crate::provider::CompletionProtocol;
use crate::registry::TaskHandle;
use crate::types::{Event, JobStatus, now_millis};
use crate::workspace::JobWorkspace;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::JobEngine;

/// Failure recorded for jobs whose submission was cut short by a restart
pub const INTERRUPTED_SUBMISSION: &str = "Interrupted before submission completed";

impl JobEngine {
    /// Pick up jobs left in flight by a previous process
    ///
    /// PROCESSING jobs are tracked again; poll-based ones resume polling with a full
    /// attempt budget and callback-based ones wait for their callback. DRAFT jobs never
    /// learned their provider task id, so they cannot be tracked and are failed.
    ///
    /// Returns the number of jobs resumed.
    pub(crate) async fn restore_in_flight(&self) -> Result<usize> {
        let drafts = self
            .store
            .list_jobs(&JobFilter {
                status: Some(JobStatus::Draft),
                ..Default::default()
            })
            .await?;
        for record in drafts {
            let update = TerminalUpdate::failed(INTERRUPTED_SUBMISSION, record.created_at, now_millis());
            if self
                .store
                .finish_job(record.id, JobStatus::Draft, &update)
                .await?
            {
                tracing::warn!(job_id = record.id.0, kind = %record.kind, "Failed interrupted submission");
                self.emit_event(Event::JobSubmissionFailed {
                    id: record.id,
                    kind: record.kind,
                    error: INTERRUPTED_SUBMISSION.to_string(),
                });
            }
        }

        let processing = self
            .store
            .list_jobs(&JobFilter {
                status: Some(JobStatus::Processing),
                ..Default::default()
            })
            .await?;

        let mut resumed = 0;
        for record in processing {
            // Leftovers of a finalize that never finished
            JobWorkspace::discard(self.config.temp_dir(), record.id).await;

            let Some(external_task_id) = record.external_task_id.clone() else {
                tracing::warn!(job_id = record.id.0, "Processing job without provider task id");
                continue;
            };
            let provider = match self.providers.get(record.kind) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::warn!(job_id = record.id.0, error = %e, "Cannot resume job");
                    continue;
                }
            };

            let handle = TaskHandle::new(record.id, record.kind, CancellationToken::new());
            let cancel = handle.cancellation_token();
            if self.registry.register(handle).is_err() {
                continue;
            }
            if provider.protocol() == CompletionProtocol::Poll {
                self.spawn_poll_loop(record.id, record.kind, external_task_id, cancel);
            }
            resumed += 1;
        }

        if resumed > 0 {
            tracing::info!(resumed, "Restored in-flight jobs");
        }
        Ok(resumed)
    }

    /// Gracefully shut down the engine
    ///
    /// Stops accepting submissions, stops every poll loop and waits (up to
    /// `engine.shutdown_timeout`) for in-flight provider requests and finalizations to
    /// finish. Jobs still PROCESSING stay PROCESSING in the store and are resumed by
    /// the next engine started on it.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.registry.cancel_all();
        self.tasks.close();

        let timeout = self.config.engine.shutdown_timeout;
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Timeout waiting for poll loops to stop, proceeding with shutdown"
            );
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
