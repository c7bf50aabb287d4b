//! Job orchestration engine split into focused submodules.
//!
//! The `JobEngine` struct and its methods are organized by domain:
//! - [`submit`] - Job creation and provider submission
//! - [`poll`] - Bounded poll loops for poll-based providers
//! - [`callback`] - Inbound provider callbacks
//! - [`finalize`] - The single idempotent completion path
//! - [`control`] - Status queries, cancellation, listing and deletion
//! - [`lifecycle`] - Startup restore and shutdown coordination
//! - [`notifications`] - Outbound notification webhooks

mod callback;
mod control;
mod finalize;
mod lifecycle;
mod notifications;
mod poll;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use callback::CallbackAck;

use crate::artifacts::{ArtifactStore, LocalArtifactStore};
use crate::config::Config;
use crate::db::{Database, JobStore};
use crate::error::{Error, Result};
use crate::fetcher::ResultFetcher;
use crate::provider::ProviderSet;
use crate::registry::TaskRegistry;
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::task::TaskTracker;

/// The job orchestrator (cloneable - all fields are Arc-wrapped)
///
/// One engine serves every job kind; behaviour per kind comes from the
/// [`Provider`](crate::provider::Provider) registered for it.
#[derive(Clone)]
pub struct JobEngine {
    /// Durable job records
    pub(crate) store: Arc<dyn JobStore>,
    /// Stored results and uploaded inputs
    pub(crate) artifacts: Arc<dyn ArtifactStore>,
    /// Provider adapter per job kind
    pub(crate) providers: ProviderSet,
    /// Result downloads with retry
    pub(crate) fetcher: ResultFetcher,
    /// In-flight job handles
    pub(crate) registry: TaskRegistry,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Permits for in-flight provider requests and finalization
    pub(crate) workers: Arc<Semaphore>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Spawned poll loops, awaited on shutdown
    pub(crate) tasks: TaskTracker,
}

impl JobEngine {
    /// Create an engine over explicit collaborators
    ///
    /// Validates the configuration, prepares the temp directory and restores jobs that
    /// were in flight when the previous process stopped.
    pub async fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        providers: ProviderSet,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.temp_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir().display(),
                        e
                    ),
                ))
            })?;

        let fetcher = ResultFetcher::new(&config.fetch)?;
        let (event_tx, _rx) = broadcast::channel(1000);

        tracing::info!(
            kinds = ?providers.kinds(),
            max_concurrent_jobs = config.engine.max_concurrent_jobs,
            "Job engine initialized"
        );

        let engine = Self {
            store,
            artifacts,
            providers,
            fetcher,
            registry: TaskRegistry::new(),
            event_tx,
            workers: Arc::new(Semaphore::new(config.engine.max_concurrent_jobs)),
            config: Arc::new(config),
            accepting_new: Arc::new(AtomicBool::new(true)),
            tasks: TaskTracker::new(),
        };

        engine.restore_in_flight().await?;

        Ok(engine)
    }

    /// Create an engine backed by SQLite, local artifact storage and the HTTP providers
    /// named in `config.providers`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use genjob::{Config, JobEngine, JobKind, JobRequest};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let engine = JobEngine::open(Config::default()).await?;
    ///
    ///     let id = engine
    ///         .submit(JobRequest::new(
    ///             JobKind::FaceSwap,
    ///             vec!["face.png".into(), "clip.mp4".into()],
    ///         ))
    ///         .await?;
    ///     println!("{:?}", engine.get_status(id).await?);
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(config: Config) -> Result<Self> {
        let store = Database::new(&config.persistence.database_path).await?;
        let artifacts = LocalArtifactStore::new(
            config.persistence.artifact_dir.clone(),
            config.persistence.public_base_url.clone(),
        )
        .await?;
        let providers = ProviderSet::from_config(&config.providers)?;

        Self::new(config, Arc::new(store), Arc::new(artifacts), providers).await
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives all events independently. A subscriber that falls more
    /// than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Number of jobs currently tracked in memory
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let engine = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(engine, config).await })
    }
}

impl std::fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("providers", &self.providers)
            .field("in_flight", &self.registry.len())
            .finish()
    }
}
