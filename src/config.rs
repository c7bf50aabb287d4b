//! Configuration types for genjob

use crate::error::{Error, Result};
use crate::types::JobKind;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Engine runtime configuration (workspaces, worker pool, shutdown)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EngineConfig {
    /// Directory holding per-job scratch workspaces (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Number of poll or finalize operations allowed in flight at once (default: 10)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// How long shutdown waits for background work (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Poll loop budget for poll-based providers
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PollingConfig {
    /// Status queries before the job times out (default: 20)
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between status queries, in milliseconds (default: 3000)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    #[schema(value_type = u64)]
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_attempts(),
            interval: default_poll_interval(),
        }
    }
}

/// Backoff shape between retry attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `delay * attempt`
    #[default]
    Linear,
    /// `delay * 2^(attempt - 1)`
    Exponential,
}

/// Result download retry configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchConfig {
    /// Total download attempts (default: 3)
    #[serde(default = "default_fetch_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts, in milliseconds (default: 2000)
    #[serde(default = "default_fetch_delay", with = "millis_serde")]
    #[schema(value_type = u64)]
    pub delay: Duration,

    /// How the delay grows with each attempt (default: linear)
    #[serde(default)]
    pub backoff: Backoff,

    /// Upper bound on any single delay (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_delay: Duration,

    /// Timeout for a single download request (default: 120 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub request_timeout: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_fetch_attempts(),
            delay: default_fetch_delay(),
            backoff: Backoff::Linear,
            max_delay: default_max_delay(),
            request_timeout: default_fetch_timeout(),
            jitter: false,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./genjob.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory where result artifacts are stored (default: "./artifacts")
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Public URL prefix for stored artifacts; `file://` URLs are used when unset
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            artifact_dir: default_artifact_dir(),
            public_base_url: None,
        }
    }
}

/// Connection settings for one provider
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderEndpoint {
    /// Base URL of the provider API
    pub base_url: String,

    /// Credential sent in the provider's auth header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Public URL of this service's callback endpoint for the kind
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Timeout for submit and poll requests (default: 60 seconds)
    #[serde(default = "default_provider_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub request_timeout: Duration,
}

impl ProviderEndpoint {
    /// Endpoint with only a base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            callback_url: None,
            request_timeout: default_provider_timeout(),
        }
    }
}

/// Provider endpoints, one optional entry per job kind
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ProvidersConfig {
    /// Face swap provider (poll-based)
    #[serde(default)]
    pub face_swap: Option<ProviderEndpoint>,

    /// Outfit merge provider (poll-based)
    #[serde(default)]
    pub outfit_merge: Option<ProviderEndpoint>,

    /// Music generation provider (callback-based)
    #[serde(default)]
    pub music_gen: Option<ProviderEndpoint>,

    /// Sheet transcription provider (callback-based)
    #[serde(default)]
    pub sheet_gen: Option<ProviderEndpoint>,
}

impl ProvidersConfig {
    /// Endpoint configured for a kind
    pub fn endpoint(&self, kind: JobKind) -> Option<&ProviderEndpoint> {
        match kind {
            JobKind::FaceSwap => self.face_swap.as_ref(),
            JobKind::OutfitMerge => self.outfit_merge.as_ref(),
            JobKind::MusicGen => self.music_gen.as_ref(),
            JobKind::SheetGen => self.sheet_gen.as_ref(),
        }
    }
}

/// Outbound notification configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct NotificationConfig {
    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Events that trigger this webhook
    pub events: Vec<WebhookEvent>,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub timeout: Duration,
}

/// Webhook trigger event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum WebhookEvent {
    /// Triggered when a job completes successfully
    OnComplete,
    /// Triggered when a job fails
    OnFailed,
    /// Triggered when a job is cancelled
    OnCancelled,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6789)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for JobEngine
///
/// Every section has defaults, so `Config::default()` is a working local setup
/// with no providers configured.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Workspaces, worker pool and shutdown
    #[serde(default)]
    pub engine: EngineConfig,

    /// Poll loop budget
    #[serde(default)]
    pub polling: PollingConfig,

    /// Result download retries
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Database and artifact locations
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Provider endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Outbound notifications
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// REST API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.engine.temp_dir
    }

    /// Check settings that would make the engine misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_concurrent_jobs == 0 {
            return Err(config_error(
                "max_concurrent_jobs must be at least 1",
                "engine.max_concurrent_jobs",
            ));
        }
        if self.polling.max_attempts == 0 {
            return Err(config_error(
                "polling needs at least one attempt",
                "polling.max_attempts",
            ));
        }
        if self.fetch.max_attempts == 0 {
            return Err(config_error(
                "fetching needs at least one attempt",
                "fetch.max_attempts",
            ));
        }
        for kind in JobKind::ALL {
            if let Some(endpoint) = self.providers.endpoint(kind) {
                url::Url::parse(&endpoint.base_url).map_err(|e| {
                    config_error(
                        format!("invalid base_url for {kind}: {e}"),
                        format!("providers.{kind}.base_url"),
                    )
                })?;
                if let Some(callback) = &endpoint.callback_url {
                    url::Url::parse(callback).map_err(|e| {
                        config_error(
                            format!("invalid callback_url for {kind}: {e}"),
                            format!("providers.{kind}.callback_url"),
                        )
                    })?;
                }
            }
        }
        for webhook in &self.notifications.webhooks {
            url::Url::parse(&webhook.url).map_err(|e| {
                config_error(
                    format!("invalid webhook url {}: {e}", webhook.url),
                    "notifications.webhooks",
                )
            })?;
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.into()),
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_concurrent_jobs() -> usize {
    10
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_attempts() -> u32 {
    20
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_fetch_attempts() -> u32 {
    3
}

fn default_fetch_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./genjob.db")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6789))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
