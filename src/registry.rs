//! In-process registry of in-flight jobs
//!
//! A [`TaskHandle`] exists for every job the engine is actively tracking and carries
//! the job's cancellation token. Finalize and cancel remove it as soon as the job is
//! terminal, after which status comes from the job record. Handles live only in memory. The job record stays the source of truth, so losing a handle
//! (process restart, explicit removal) never loses job state.
//!
//! The registry also hands out [`FinalizeClaim`]s, which keep two finalize calls for the
//! same job from running their side effects at the same time, and tracks submissions
//! still in flight so a callback that beats its submission can be held until the
//! provider task id is recorded.

use crate::error::JobError;
use crate::types::{JobId, JobKind, Outcome};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Cancellable handle for one in-flight job
#[derive(Clone, Debug)]
pub struct TaskHandle {
    job_id: JobId,
    kind: JobKind,
    cancel: CancellationToken,
}

impl TaskHandle {
    /// Create a handle driven by `cancel`
    pub fn new(job_id: JobId, kind: JobKind, cancel: CancellationToken) -> Self {
        Self {
            job_id,
            kind,
            cancel,
        }
    }

    /// Job this handle tracks
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Kind of the tracked job
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Token observed by the job's poll loop
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal cancellation to whoever is waiting on this job
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been signalled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Concurrency-safe map of job id to [`TaskHandle`]
///
/// Cloning is cheap and yields a view of the same registry.
#[derive(Clone, Debug, Default)]
pub struct TaskRegistry {
    handles: Arc<RwLock<HashMap<JobId, TaskHandle>>>,
    finalizing: Arc<Mutex<HashSet<JobId>>>,
    submissions: Arc<Mutex<Submissions>>,
}

/// Submissions in flight per kind and the callbacks that arrived ahead of them
#[derive(Debug, Default)]
struct Submissions {
    in_flight: HashMap<JobKind, usize>,
    early: HashMap<(JobKind, String), Outcome>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle; fails if one is already registered for the job
    pub fn register(&self, handle: TaskHandle) -> Result<(), JobError> {
        let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
        let id = handle.job_id();
        if handles.contains_key(&id) {
            return Err(JobError::DuplicateHandle { id: id.0 });
        }
        handles.insert(id, handle);
        Ok(())
    }

    /// Handle for a job, if one is registered
    pub fn lookup(&self, id: JobId) -> Option<TaskHandle> {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        handles.get(&id).cloned()
    }

    /// Remove a job's handle; removing an absent id is a no-op
    pub fn remove(&self, id: JobId) -> Option<TaskHandle> {
        let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
        handles.remove(&id)
    }

    /// Ids of all registered jobs
    pub fn ids(&self) -> Vec<JobId> {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        handles.keys().copied().collect()
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.handles.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no handles are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal cancellation on every registered handle without removing them
    pub fn cancel_all(&self) {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        for handle in handles.values() {
            handle.cancel();
        }
    }

    /// Take the exclusive right to finalize a job
    ///
    /// Returns `None` while another claim for the same job is alive. The claim is
    /// released when the returned guard is dropped.
    pub fn try_claim_finalize(&self, id: JobId) -> Option<FinalizeClaim> {
        let mut finalizing = self.finalizing.lock().unwrap_or_else(|e| e.into_inner());
        if !finalizing.insert(id) {
            return None;
        }
        Some(FinalizeClaim {
            id,
            finalizing: Arc::clone(&self.finalizing),
        })
    }

    /// Mark a submission of `kind` as in flight until the guard is dropped
    ///
    /// Early callbacks for the kind are discarded once no submission of it is left.
    pub fn begin_submission(&self, kind: JobKind) -> SubmissionGuard {
        let mut submissions = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        *submissions.in_flight.entry(kind).or_default() += 1;
        SubmissionGuard {
            kind,
            submissions: Arc::clone(&self.submissions),
        }
    }

    /// Whether a submission of `kind` is in flight
    pub fn is_submitting(&self, kind: JobKind) -> bool {
        let submissions = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        submissions.in_flight.contains_key(&kind)
    }

    /// Hold a terminal callback outcome whose job is not yet known
    ///
    /// Returns `false`, holding nothing, when no submission of `kind` is in flight.
    /// A later callback for the same task replaces the held outcome.
    pub fn hold_early_callback(
        &self,
        kind: JobKind,
        external_task_id: &str,
        outcome: Outcome,
    ) -> bool {
        let mut submissions = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        if !submissions.in_flight.contains_key(&kind) {
            return false;
        }
        submissions
            .early
            .insert((kind, external_task_id.to_string()), outcome);
        true
    }

    /// Remove and return a held callback outcome; exactly one caller receives it
    pub fn take_early_callback(&self, kind: JobKind, external_task_id: &str) -> Option<Outcome> {
        let mut submissions = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        submissions
            .early
            .remove(&(kind, external_task_id.to_string()))
    }
}

/// In-flight submission marker, released on drop
#[derive(Debug)]
pub struct SubmissionGuard {
    kind: JobKind,
    submissions: Arc<Mutex<Submissions>>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        let mut submissions = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = match submissions.in_flight.get_mut(&self.kind) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            let kind = self.kind;
            submissions.in_flight.remove(&kind);
            submissions.early.retain(|(k, _), _| *k != kind);
        }
    }
}

/// Exclusive finalize right for one job, released on drop
#[derive(Debug)]
pub struct FinalizeClaim {
    id: JobId,
    finalizing: Arc<Mutex<HashSet<JobId>>>,
}

impl FinalizeClaim {
    /// Claimed job
    pub fn job_id(&self) -> JobId {
        self.id
    }
}

impl Drop for FinalizeClaim {
    fn drop(&mut self) {
        let mut finalizing = self.finalizing.lock().unwrap_or_else(|e| e.into_inner());
        finalizing.remove(&self.id);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: i64) -> TaskHandle {
        TaskHandle::new(JobId(id), JobKind::FaceSwap, CancellationToken::new())
    }

    #[test]
    fn register_rejects_duplicate_ids() {
        let registry = TaskRegistry::new();
        registry.register(handle(1)).unwrap();

        let err = registry.register(handle(1)).unwrap_err();
        assert!(matches!(err, JobError::DuplicateHandle { id: 1 }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = TaskRegistry::new();
        registry.register(handle(1)).unwrap();

        assert!(registry.remove(JobId(1)).is_some());
        assert!(registry.remove(JobId(1)).is_none());
        assert!(registry.remove(JobId(42)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn cloned_handles_share_cancellation() {
        let registry = TaskRegistry::new();
        let h = handle(7);
        let token = h.cancellation_token();
        registry.register(h).unwrap();

        registry.lookup(JobId(7)).unwrap().cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_all_signals_every_handle() {
        let registry = TaskRegistry::new();
        let tokens: Vec<_> = (1..=3)
            .map(|id| {
                let h = handle(id);
                let token = h.cancellation_token();
                registry.register(h).unwrap();
                token
            })
            .collect();

        registry.cancel_all();
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
        assert_eq!(registry.len(), 3, "cancel_all does not unregister");
    }

    #[test]
    fn finalize_claim_is_exclusive_until_dropped() {
        let registry = TaskRegistry::new();

        let claim = registry.try_claim_finalize(JobId(5)).unwrap();
        assert_eq!(claim.job_id(), JobId(5));
        assert!(registry.try_claim_finalize(JobId(5)).is_none());
        assert!(
            registry.try_claim_finalize(JobId(6)).is_some(),
            "claims are per job"
        );

        drop(claim);
        assert!(registry.try_claim_finalize(JobId(5)).is_some());
    }

    #[test]
    fn early_callbacks_are_held_only_while_submitting() {
        let registry = TaskRegistry::new();
        let failed = Outcome::failed("insufficient credits");
        assert!(!registry.hold_early_callback(JobKind::MusicGen, "t-1", failed.clone()));

        let first = registry.begin_submission(JobKind::MusicGen);
        let second = registry.begin_submission(JobKind::MusicGen);
        assert!(registry.is_submitting(JobKind::MusicGen));
        assert!(!registry.is_submitting(JobKind::SheetGen));
        assert!(registry.hold_early_callback(JobKind::MusicGen, "t-1", failed.clone()));
        assert!(registry.hold_early_callback(JobKind::MusicGen, "t-2", failed.clone()));

        assert_eq!(registry.take_early_callback(JobKind::MusicGen, "t-1"), Some(failed));
        assert_eq!(registry.take_early_callback(JobKind::MusicGen, "t-1"), None);
        assert_eq!(registry.take_early_callback(JobKind::SheetGen, "t-2"), None);

        drop(first);
        assert!(registry.is_submitting(JobKind::MusicGen));
        drop(second);
        assert!(!registry.is_submitting(JobKind::MusicGen));
        assert_eq!(
            registry.take_early_callback(JobKind::MusicGen, "t-2"),
            None,
            "held callbacks go with the last submission"
        );
    }

    #[tokio::test]
    async fn concurrent_registration_and_lookup_from_many_tasks() {
        let registry = TaskRegistry::new();
        let mut tasks = Vec::new();
        for id in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.register(handle(id)).unwrap();
                assert!(registry.lookup(JobId(id)).is_some());
                if id % 2 == 0 {
                    registry.remove(JobId(id));
                    registry.remove(JobId(id));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.len(), 32);
    }
}
