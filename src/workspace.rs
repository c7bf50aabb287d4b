//! Per-job scratch directories
//!
//! Each job gets `<temp_dir>/job_<id>` for transient files such as the staged result
//! download. The normal path removes it with [`JobWorkspace::close`]; a workspace
//! dropped without being closed (early return, unwinding) is removed synchronously in
//! `Drop`, so every exit path cleans up.

use crate::types::JobId;
use std::path::{Path, PathBuf};

/// Directory holding a job's transient files
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: JobId,
    path: PathBuf,
    closed: bool,
}

impl JobWorkspace {
    /// Path a job's workspace uses under `temp_dir`
    pub fn path_for(temp_dir: &Path, job_id: JobId) -> PathBuf {
        temp_dir.join(format!("job_{}", job_id.0))
    }

    /// Create (or reopen) the workspace for a job
    pub async fn create(temp_dir: &Path, job_id: JobId) -> std::io::Result<Self> {
        let path = Self::path_for(temp_dir, job_id);
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self {
            job_id,
            path,
            closed: false,
        })
    }

    /// Job this workspace belongs to
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the workspace without blocking the runtime
    pub async fn close(mut self) {
        remove_logged(&self.path, self.job_id).await;
        self.closed = true;
    }

    /// Remove a job's workspace without holding a guard for it
    pub async fn discard(temp_dir: &Path, job_id: JobId) {
        remove_logged(&Self::path_for(temp_dir, job_id), job_id).await;
    }
}

async fn remove_logged(path: &Path, job_id: JobId) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!(job_id = job_id.0, "Removed job workspace"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(job_id = job_id.0, error = %e, "Failed to remove job workspace"),
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                job_id = self.job_id.0,
                path = %self.path.display(),
                error = %e,
                "Failed to remove job workspace"
            ),
        }
    }
}
