//! Bounded poll loops for poll-based providers.
//!
//! Each loop is a tokio task that sleeps on a timer between attempts. A worker permit
//! is held only while a status request or finalization is in flight, so the number of
//! jobs being polled is not limited by the pool size.

use crate::provider::PollStatus;
use crate::types::{Event, JobId, JobKind, Outcome};
use tokio_util::sync::CancellationToken;

use super::JobEngine;

/// Failure recorded when polling runs out of attempts
pub(crate) fn timeout_message(max_attempts: u32) -> String {
    format!("Task timeout after {} attempts", max_attempts)
}

impl JobEngine {
    /// Start polling a job in the background
    pub(crate) fn spawn_poll_loop(
        &self,
        id: JobId,
        kind: JobKind,
        external_task_id: String,
        cancel: CancellationToken,
    ) {
        let engine = self.clone();
        self.tasks.spawn(async move {
            engine.run_poll_loop(id, kind, external_task_id, cancel).await;
        });
    }

    /// Poll until a terminal status, cancellation, or the attempt budget runs out
    ///
    /// Individual poll failures are absorbed; the job only fails on an explicit provider
    /// failure or once every attempt has been spent without a terminal answer.
    async fn run_poll_loop(
        &self,
        id: JobId,
        kind: JobKind,
        external_task_id: String,
        cancel: CancellationToken,
    ) {
        let provider = match self.providers.get(kind) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::error!(job_id = id.0, error = %e, "No provider for poll loop");
                return;
            }
        };
        let max_attempts = self.config.polling.max_attempts;
        let interval = self.config.polling.interval;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(job_id = id.0, "Poll loop stopped by cancellation");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            let answer = {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    permit = self.workers.acquire() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    answer = provider.poll_status(&external_task_id) => answer,
                }
            };

            let outcome = match answer {
                Ok(PollStatus::Processing) => {
                    tracing::debug!(job_id = id.0, attempt, max_attempts, "Job still processing");
                    self.emit_event(Event::JobPolled { id, attempt });
                    continue;
                }
                Ok(PollStatus::Completed { download_url }) => Outcome::Succeeded { download_url },
                Ok(PollStatus::Failed { error }) => Outcome::Failed { error },
                Err(e) => {
                    tracing::warn!(
                        job_id = id.0,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Poll attempt failed"
                    );
                    self.emit_event(Event::JobPolled { id, attempt });
                    continue;
                }
            };

            self.finalize_with_permit(id, outcome, &cancel).await;
            return;
        }

        tracing::warn!(job_id = id.0, max_attempts, "Polling budget exhausted");
        self.finalize_with_permit(id, Outcome::failed(timeout_message(max_attempts)), &cancel)
            .await;
    }

    async fn finalize_with_permit(&self, id: JobId, outcome: Outcome, cancel: &CancellationToken) {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            permit = self.workers.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        self.finalize(id, outcome).await;
    }
}
