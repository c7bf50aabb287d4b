//! Face swap provider (poll-based)
//!
//! `POST {base}/tasks` (multipart: one `image` part per face, then `video`) answers
//! `{"task_id": ...}`; `GET {base}/tasks/{id}` answers
//! `{"status": ..., "download_url"?: ..., "error"?: ...}`.

use super::http::{build_client, check_status, file_part, join, read_inputs, string_at};
use super::{
    CompletionProtocol, MISSING_RESULT_URL, PollStatus, Provider, RemoteStatus, SubmitRequest,
    UNKNOWN_PROVIDER_ERROR,
};
use crate::config::ProviderEndpoint;
use crate::error::{JobError, ProviderError, Result};
use crate::types::JobKind;
use async_trait::async_trait;

/// HTTP adapter for the face swap service
#[derive(Clone, Debug)]
pub struct FaceSwapProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FaceSwapProvider {
    /// Adapter for the given endpoint
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint)?,
            base_url: endpoint.base_url.clone(),
            api_key: endpoint.api_key.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl Provider for FaceSwapProvider {
    fn kind(&self) -> JobKind {
        JobKind::FaceSwap
    }

    fn protocol(&self) -> CompletionProtocol {
        CompletionProtocol::Poll
    }

    fn validate_inputs(&self, inputs: &[String]) -> std::result::Result<(), JobError> {
        if inputs.len() < 2 {
            return Err(JobError::InvalidInput {
                reason: "face swap needs at least one face image followed by a target video"
                    .into(),
            });
        }
        Ok(())
    }

    async fn submit(&self, request: SubmitRequest<'_>) -> std::result::Result<String, ProviderError> {
        let mut inputs = read_inputs(&request).await?;
        let video = inputs.pop().ok_or_else(|| ProviderError::Rejected {
            message: "no target video".into(),
        })?;

        let mut form = reqwest::multipart::Form::new();
        for face in inputs {
            form = form.part("image", file_part(face));
        }
        form = form.part("video", file_part(video));

        let response = self
            .authorize(self.client.post(join(&self.base_url, "tasks")))
            .multipart(form)
            .send()
            .await?;
        let body: serde_json::Value = check_status(response).await?.json().await?;

        string_at(&body, "/task_id")
            .or_else(|| string_at(&body, "/id"))
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "face swap response has no task_id".into(),
            })
    }

    async fn poll_status(
        &self,
        external_task_id: &str,
    ) -> std::result::Result<PollStatus, ProviderError> {
        let url = join(&self.base_url, &format!("tasks/{external_task_id}"));
        let response = self.authorize(self.client.get(url)).send().await?;
        let body: serde_json::Value = check_status(response).await?.json().await?;

        let status = string_at(&body, "/status").unwrap_or_default();
        Ok(match RemoteStatus::parse(&status) {
            Some(RemoteStatus::Completed) => match string_at(&body, "/download_url") {
                Some(download_url) => PollStatus::Completed { download_url },
                None => PollStatus::Failed {
                    error: MISSING_RESULT_URL.into(),
                },
            },
            Some(RemoteStatus::Failed) => PollStatus::Failed {
                error: string_at(&body, "/error").unwrap_or_else(|| UNKNOWN_PROVIDER_ERROR.into()),
            },
            Some(RemoteStatus::Pending) => PollStatus::Processing,
            None => {
                return Err(ProviderError::InvalidResponse {
                    message: format!("unknown face swap status {status:?}"),
                });
            }
        })
    }
}
