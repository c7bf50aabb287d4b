//! Outfit merge provider (poll-based)
//!
//! Submission is a multipart `POST {base}` with `cloth_image`, `model_image` and
//! `cloth_type=full`, authenticated by `X-API-KEY`. The task is only accepted when the
//! answer's status is `CREATED`. Status lives at `GET {base}/{id}`; completed tasks
//! carry `download_signed_url`.

use super::http::{build_client, check_status, file_part, join, read_inputs, string_at};
use super::{
    CompletionProtocol, MISSING_RESULT_URL, PollStatus, Provider, RemoteStatus, SubmitRequest,
    UNKNOWN_PROVIDER_ERROR,
};
use crate::config::ProviderEndpoint;
use crate::error::{JobError, ProviderError, Result};
use crate::types::JobKind;
use async_trait::async_trait;

const API_KEY_HEADER: &str = "X-API-KEY";

/// HTTP adapter for the outfit merge service
#[derive(Clone, Debug)]
pub struct OutfitMergeProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OutfitMergeProvider {
    /// Adapter for the given endpoint
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint)?,
            base_url: endpoint.base_url.clone(),
            api_key: endpoint.api_key.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Provider for OutfitMergeProvider {
    fn kind(&self) -> JobKind {
        JobKind::OutfitMerge
    }

    fn protocol(&self) -> CompletionProtocol {
        CompletionProtocol::Poll
    }

    fn validate_inputs(&self, inputs: &[String]) -> std::result::Result<(), JobError> {
        if inputs.len() != 2 {
            return Err(JobError::InvalidInput {
                reason: format!(
                    "outfit merge needs exactly a cloth image and a model image, got {} inputs",
                    inputs.len()
                ),
            });
        }
        Ok(())
    }

    async fn submit(&self, request: SubmitRequest<'_>) -> std::result::Result<String, ProviderError> {
        let mut inputs = read_inputs(&request).await?.into_iter();
        let (Some(cloth), Some(model)) = (inputs.next(), inputs.next()) else {
            return Err(ProviderError::Rejected {
                message: "missing cloth or model image".into(),
            });
        };

        let form = reqwest::multipart::Form::new()
            .part("cloth_image", file_part(cloth))
            .part("model_image", file_part(model))
            .text("cloth_type", "full");

        let response = self
            .client
            .post(&self.base_url)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;
        let body: serde_json::Value = check_status(response).await?.json().await?;

        let status = string_at(&body, "/status").unwrap_or_default();
        if !status.eq_ignore_ascii_case("CREATED") {
            return Err(ProviderError::Rejected {
                message: string_at(&body, "/error")
                    .unwrap_or_else(|| format!("task not created (status {status:?})")),
            });
        }
        string_at(&body, "/task_id").ok_or_else(|| ProviderError::InvalidResponse {
            message: "outfit merge response has no task_id".into(),
        })
    }

    async fn poll_status(
        &self,
        external_task_id: &str,
    ) -> std::result::Result<PollStatus, ProviderError> {
        let response = self
            .client
            .get(join(&self.base_url, external_task_id))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let body: serde_json::Value = check_status(response).await?.json().await?;

        let status = string_at(&body, "/status").unwrap_or_default();
        match RemoteStatus::parse(&status) {
            Some(RemoteStatus::Pending) => Ok(PollStatus::Processing),
            Some(RemoteStatus::Completed) => Ok(match string_at(&body, "/download_signed_url") {
                Some(download_url) => PollStatus::Completed { download_url },
                None => PollStatus::Failed {
                    error: MISSING_RESULT_URL.into(),
                },
            }),
            Some(RemoteStatus::Failed) => Ok(PollStatus::Failed {
                error: string_at(&body, "/error").unwrap_or_else(|| UNKNOWN_PROVIDER_ERROR.into()),
            }),
            None => Err(ProviderError::InvalidResponse {
                message: format!("unknown outfit merge status {status:?}"),
            }),
        }
    }
}
