//! Provider protocol abstraction
//!
//! Every job kind is served by one [`Provider`]. A provider either answers status
//! queries ([`CompletionProtocol::Poll`]) or pushes a notification to this service's
//! callback endpoint ([`CompletionProtocol::Callback`]); the engine drives both through
//! the same trait so all kinds share one engine instance.

mod face_swap;
mod http;
mod music;
mod outfit_merge;
mod sheet;

pub use face_swap::FaceSwapProvider;
pub use music::MusicProvider;
pub use outfit_merge::OutfitMergeProvider;
pub use sheet::SheetProvider;

use crate::artifacts::ArtifactStore;
use crate::config::ProvidersConfig;
use crate::error::{JobError, ProviderError, Result};
use crate::types::{JobId, JobKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Failure recorded when a provider claims success but names no result
pub const MISSING_RESULT_URL: &str = "Provider reported completion without a result URL";

/// Failure recorded when a provider reports failure without a reason
pub const UNKNOWN_PROVIDER_ERROR: &str = "Unknown error";

/// How a provider signals completion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionProtocol {
    /// The engine queries status until a terminal answer
    Poll,
    /// The provider calls the engine's callback endpoint
    Callback,
}

/// Answer to a status query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStatus {
    /// Still running (CREATED/PENDING/PROCESSING)
    Processing,
    /// Finished; the result can be fetched from `download_url`
    Completed {
        /// Provider-hosted result
        download_url: String,
    },
    /// Finished unsuccessfully
    Failed {
        /// Provider-reported reason
        error: String,
    },
}

/// Remote status as reported in a poll answer or callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Accepted or running
    Pending,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl RemoteStatus {
    /// Parse a provider status string, ignoring case
    ///
    /// Returns `None` for statuses the engine does not understand.
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_ascii_uppercase().as_str() {
            "CREATED" | "PENDING" | "QUEUED" | "PROCESSING" | "RUNNING" | "IN_PROGRESS" => {
                Some(RemoteStatus::Pending)
            }
            "COMPLETED" | "COMPLETE" | "SUCCESS" | "SUCCEEDED" => Some(RemoteStatus::Completed),
            "FAILED" | "FAILURE" | "ERROR" => Some(RemoteStatus::Failed),
            _ => None,
        }
    }
}

/// Normalized inbound callback
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackPayload {
    /// Provider task the callback refers to
    pub external_task_id: String,
    /// Reported status
    pub status: RemoteStatus,
    /// Result URLs in provider order; the engine uses the first
    pub result_urls: Vec<String>,
    /// Provider-reported failure reason
    pub error: Option<String>,
}

/// Everything a provider needs to submit one job
pub struct SubmitRequest<'a> {
    /// Job being submitted
    pub job_id: JobId,
    /// Ordered input references
    pub inputs: &'a [String],
    /// Optional caller label
    pub title: Option<&'a str>,
    /// Resolves input references to bytes
    pub store: &'a dyn ArtifactStore,
}

/// Adapter for one external generation service
#[async_trait]
pub trait Provider: Send + Sync {
    /// Job kind this provider serves
    fn kind(&self) -> JobKind;

    /// How completion is discovered
    fn protocol(&self) -> CompletionProtocol;

    /// Reject input lists the provider cannot work with, before any record exists
    fn validate_inputs(&self, _inputs: &[String]) -> std::result::Result<(), JobError> {
        Ok(())
    }

    /// Submit the job and return the provider's task id
    async fn submit(&self, request: SubmitRequest<'_>) -> std::result::Result<String, ProviderError>;

    /// Query a task's status (poll-based providers only)
    async fn poll_status(
        &self,
        _external_task_id: &str,
    ) -> std::result::Result<PollStatus, ProviderError> {
        Err(ProviderError::NotPollable { kind: self.kind() })
    }

    /// Parse an inbound callback body (callback-based providers only)
    fn parse_callback(
        &self,
        _body: &serde_json::Value,
    ) -> std::result::Result<CallbackPayload, ProviderError> {
        Err(ProviderError::NotCallbackBased { kind: self.kind() })
    }

    /// Extra headers required when fetching this provider's results
    fn download_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Providers keyed by the job kind they serve
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<JobKind, Arc<dyn Provider>>,
}

impl ProviderSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, replacing any previous one for the same kind
    pub fn insert(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.insert(provider);
        self
    }

    /// Provider for a kind
    pub fn get(&self, kind: JobKind) -> std::result::Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::Unsupported { kind })
    }

    /// Kinds with a provider
    pub fn kinds(&self) -> Vec<JobKind> {
        JobKind::ALL
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }

    /// Build the HTTP adapters for every configured endpoint
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let mut set = ProviderSet::new();
        if let Some(endpoint) = &config.face_swap {
            set.insert(Arc::new(FaceSwapProvider::new(endpoint)?));
        }
        if let Some(endpoint) = &config.outfit_merge {
            set.insert(Arc::new(OutfitMergeProvider::new(endpoint)?));
        }
        if let Some(endpoint) = &config.music_gen {
            set.insert(Arc::new(MusicProvider::new(endpoint)?));
        }
        if let Some(endpoint) = &config.sheet_gen {
            set.insert(Arc::new(SheetProvider::new(endpoint)?));
        }
        Ok(set)
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("kinds", &self.kinds())
            .finish()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderEndpoint;

    #[test]
    fn remote_status_is_case_insensitive() {
        assert_eq!(RemoteStatus::parse("completed"), Some(RemoteStatus::Completed));
        assert_eq!(RemoteStatus::parse(" FAILED "), Some(RemoteStatus::Failed));
        assert_eq!(RemoteStatus::parse("Created"), Some(RemoteStatus::Pending));
        assert_eq!(RemoteStatus::parse("processing"), Some(RemoteStatus::Pending));
        assert_eq!(RemoteStatus::parse("teleported"), None);
    }

    #[test]
    fn from_config_builds_only_configured_kinds() {
        let config = ProvidersConfig {
            face_swap: Some(ProviderEndpoint::new("http://faces.local")),
            sheet_gen: Some(ProviderEndpoint::new("http://sheets.local")),
            ..Default::default()
        };
        let set = ProviderSet::from_config(&config).unwrap();

        assert_eq!(set.kinds(), vec![JobKind::FaceSwap, JobKind::SheetGen]);
        assert_eq!(
            set.get(JobKind::FaceSwap).unwrap().protocol(),
            CompletionProtocol::Poll
        );
        assert_eq!(
            set.get(JobKind::SheetGen).unwrap().protocol(),
            CompletionProtocol::Callback
        );
        assert!(matches!(
            set.get(JobKind::MusicGen),
            Err(ProviderError::Unsupported {
                kind: JobKind::MusicGen
            })
        ));
    }
}
