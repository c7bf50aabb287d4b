//! Result download with bounded retry
//!
//! [`ResultFetcher`] streams a provider-hosted result into a staging file. A non-2xx
//! answer, a transport error and an empty body all count as failed attempts; only an
//! unusable URL fails without retrying.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::retry::{IsRetryable, RetryPolicy, retry_with_backoff};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Why a single download attempt failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The URL cannot be downloaded from
    #[error("invalid result URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parse or scheme problem
        reason: String,
    },

    /// The server answered with a non-success status
    #[error("server responded with HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The server answered 2xx with no content
    #[error("server returned an empty body")]
    EmptyBody,

    /// Connection, timeout or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The staging file could not be written
    #[error("staging file error: {0}")]
    Io(String),
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidUrl { .. })
    }
}

/// Download that failed after every allowed attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to download result after {attempts} attempts: {last_error}")]
pub struct DownloadFailed {
    /// Attempts actually made
    pub attempts: u32,
    /// Error of the final attempt
    pub last_error: FetchError,
}

/// A downloaded result on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Staging file holding the bytes
    pub path: PathBuf,
    /// Number of bytes written
    pub size: u64,
}

/// Downloads completed artifacts from provider-supplied URLs
#[derive(Clone, Debug)]
pub struct ResultFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ResultFetcher {
    /// Build a fetcher with its own HTTP client
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self::with_client(client, RetryPolicy::from(config)))
    }

    /// Build a fetcher around an existing client
    pub fn with_client(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Retry policy applied to each download
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `url` into `dest`, retrying failed attempts
    ///
    /// `headers` are sent with every attempt (some providers require their API key on
    /// the result URL). On failure `dest` does not exist.
    pub async fn download(
        &self,
        url: &str,
        headers: &[(String, String)],
        dest: &Path,
    ) -> std::result::Result<FetchedFile, DownloadFailed> {
        let parsed = match validate_url(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(url, error = %e, "Refusing to download result");
                return Err(DownloadFailed {
                    attempts: 1,
                    last_error: e,
                });
            }
        };

        let mut attempts = 0;
        let result = retry_with_backoff(&self.policy, |attempt| {
            attempts = attempt;
            let parsed = parsed.clone();
            async move {
                tracing::debug!(url = %parsed, attempt, "Downloading result");
                let outcome = self.attempt(parsed, headers, dest).await;
                if outcome.is_err() {
                    tokio::fs::remove_file(dest).await.ok();
                }
                outcome
            }
        })
        .await;

        result.map_err(|last_error| DownloadFailed {
            attempts,
            last_error,
        })
    }

    async fn attempt(
        &self,
        url: url::Url,
        headers: &[(String, String)],
        dest: &Path,
    ) -> std::result::Result<FetchedFile, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;
        let mut size = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Io(e.to_string()))?;
            size += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        if size == 0 {
            return Err(FetchError::EmptyBody);
        }

        Ok(FetchedFile {
            path: dest.to_path_buf(),
            size,
        })
    }
}

fn validate_url(url: &str) -> std::result::Result<url::Url, FetchError> {
    let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}
