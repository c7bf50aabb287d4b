//! # genjob
//!
//! Orchestration engine for long-running generation jobs handled by external
//! providers (face swap, outfit merge, music and sheet-music generation).
//!
//! A job is submitted once, tracked either by a bounded poll loop or by the
//! provider's completion callback, and finalized exactly once: the result is
//! downloaded with retry, stored, and the job record moves to its terminal state.
//!
//! ## Quick Start
//!
//! ```no_run
//! use genjob::{Config, JobEngine, JobKind, JobRequest};
//! use genjob::config::ProviderEndpoint;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.providers.face_swap = Some(ProviderEndpoint::new("https://swap.example.com"));
//!
//!     let engine = JobEngine::open(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let id = engine
//!         .submit(JobRequest::new(
//!             JobKind::FaceSwap,
//!             vec!["face.png".into(), "clip.mp4".into()],
//!         ))
//!         .await?;
//!     println!("submitted job {id}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Result and input artifact storage
pub mod artifacts;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Job orchestration engine (decomposed into focused submodules)
pub mod engine;
/// Error types
pub mod error;
/// Result downloads with retry
pub mod fetcher;
/// Provider adapters
pub mod provider;
/// In-memory registry of in-flight jobs
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Per-job scratch directories
pub mod workspace;

// Re-export commonly used types
pub use artifacts::{ArtifactStore, LocalArtifactStore};
pub use config::Config;
pub use db::{Database, JobStore};
pub use engine::{CallbackAck, JobEngine};
pub use error::{
    ApiError, DatabaseError, Error, ErrorDetail, JobError, ProviderError, Result, ToHttpStatus,
};
pub use provider::{CompletionProtocol, Provider, ProviderSet};
pub use types::{
    Event, JobId, JobInfo, JobKind, JobReport, JobRequest, JobStatus, Outcome, WebhookPayload,
};

/// Helper function to run the engine with graceful signal handling.
///
/// Waits for a termination signal and then calls the engine's `shutdown()` method,
/// which stops poll loops and waits for in-progress finalization.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use genjob::{Config, JobEngine, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Arc::new(JobEngine::open(Config::default()).await?);
///     engine.spawn_api_server();
///
///     run_with_shutdown(&engine).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: &JobEngine) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
