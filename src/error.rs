//! Error types for genjob
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Job, Provider, Database)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::JobKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for genjob operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for genjob
///
/// Errors raised while a job is being finalized never surface through this type;
/// they are converted into a FAILED job record instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "polling.max_attempts")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Job-related error
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Provider adapter error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Operation not supported
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Job-related errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found in the registry or the store
    #[error("job {id} not found")]
    NotFound {
        /// The job ID that was not found
        id: i64,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} job {id} in state {current_state}")]
    InvalidState {
        /// The job ID that is in an invalid state for the operation
        id: i64,
        /// The operation that was attempted (e.g., "delete")
        operation: String,
        /// The current state that prevents the operation (e.g., "processing")
        current_state: String,
    },

    /// Submitted inputs are unusable for the job kind
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Why the inputs were rejected
        reason: String,
    },

    /// A task handle is already registered for this job
    #[error("job {id} already has an in-flight handle")]
    DuplicateHandle {
        /// The job ID registered twice
        id: i64,
    },
}

/// Errors raised by provider adapters
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// No adapter is configured for the job kind
    #[error("no provider configured for {kind}")]
    Unsupported {
        /// The job kind without an adapter
        kind: JobKind,
    },

    /// The provider refused the request
    #[error("provider rejected request: {message}")]
    Rejected {
        /// Provider-supplied reason
        message: String,
    },

    /// The provider could not be reached
    #[error("provider unreachable: {message}")]
    Unreachable {
        /// Transport-level description
        message: String,
    },

    /// The provider answered with something the adapter cannot interpret
    #[error("invalid provider response: {message}")]
    InvalidResponse {
        /// What was wrong with the response
        message: String,
    },

    /// The provider does not support status polling
    #[error("{kind} provider does not support polling")]
    NotPollable {
        /// The callback-based job kind
        kind: JobKind,
    },

    /// The provider does not deliver callbacks
    #[error("{kind} provider does not deliver callbacks")]
    NotCallbackBased {
        /// The poll-based job kind
        kind: JobKind,
    },

    /// An inbound callback payload could not be parsed
    #[error("invalid callback payload: {message}")]
    InvalidCallback {
        /// Parse failure description
        message: String,
    },
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::InvalidResponse {
                message: e.to_string(),
            }
        } else {
            ProviderError::Unreachable {
                message: e.to_string(),
            }
        }
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "job error: job 123 not found",
///     "details": {
///       "job_id": 123
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Job(JobError::InvalidInput { .. }) => 400,
            Error::Provider(ProviderError::InvalidCallback { .. }) => 400,
            Error::Provider(ProviderError::NotCallbackBased { .. }) => 400,

            Error::NotFound(_) => 404,
            Error::Job(JobError::NotFound { .. }) => 404,

            Error::Job(JobError::InvalidState { .. }) => 409,
            Error::Job(JobError::DuplicateHandle { .. }) => 409,

            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            Error::Provider(ProviderError::Unsupported { .. }) => 501,
            Error::Provider(ProviderError::NotPollable { .. }) => 501,
            Error::NotSupported(_) => 501,

            Error::Provider(_) => 502,
            Error::Network(_) => 502,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Job(e) => match e {
                JobError::NotFound { .. } => "job_not_found",
                JobError::InvalidState { .. } => "invalid_state",
                JobError::InvalidInput { .. } => "invalid_input",
                JobError::DuplicateHandle { .. } => "duplicate_handle",
            },
            Error::Provider(e) => match e {
                ProviderError::Unsupported { .. } => "provider_unsupported",
                ProviderError::Rejected { .. } => "provider_rejected",
                ProviderError::Unreachable { .. } => "provider_unreachable",
                ProviderError::InvalidResponse { .. } => "provider_invalid_response",
                ProviderError::NotPollable { .. } => "provider_not_pollable",
                ProviderError::NotCallbackBased { .. } => "provider_not_callback_based",
                ProviderError::InvalidCallback { .. } => "invalid_callback",
            },
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Job(JobError::NotFound { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Job(JobError::InvalidState {
                id,
                operation,
                current_state,
            }) => Some(serde_json::json!({
                "job_id": id,
                "operation": operation,
                "current_state": current_state,
            })),
            Error::Job(JobError::DuplicateHandle { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Provider(ProviderError::Unsupported { kind })
            | Error::Provider(ProviderError::NotPollable { kind })
            | Error::Provider(ProviderError::NotCallbackBased { kind }) => {
                Some(serde_json::json!({
                    "kind": kind,
                }))
            }
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
