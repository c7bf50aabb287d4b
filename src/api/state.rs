//! Application state for the API server

use crate::{Config, JobEngine};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The engine serving every job kind
    pub engine: Arc<JobEngine>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(engine: Arc<JobEngine>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }
}
