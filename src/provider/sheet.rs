//! Sheet transcription provider (callback-based)
//!
//! Audio is uploaded to `POST {base}/transcription?model=detect&webhook_url=...` with the
//! `kl-api-key` header, answering `{"job_id": ...}`. The callback body is
//! `{"id", "status", "error"}`; the MusicXML result sits at `{base}/job/{id}/xml` and
//! needs the same key to download.

use super::http::{build_client, check_status, file_part, join, read_inputs, string_at};
use super::{
    CallbackPayload, CompletionProtocol, Provider, RemoteStatus, SubmitRequest,
    UNKNOWN_PROVIDER_ERROR,
};
use crate::config::ProviderEndpoint;
use crate::error::{JobError, ProviderError, Result};
use crate::types::JobKind;
use async_trait::async_trait;

const API_KEY_HEADER: &str = "kl-api-key";

/// HTTP adapter for the sheet transcription service
#[derive(Clone, Debug)]
pub struct SheetProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    callback_url: Option<String>,
}

impl SheetProvider {
    /// Adapter for the given endpoint
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint)?,
            base_url: endpoint.base_url.clone(),
            api_key: endpoint.api_key.clone().unwrap_or_default(),
            callback_url: endpoint.callback_url.clone(),
        })
    }

    fn result_url(&self, job_id: &str) -> String {
        join(&self.base_url, &format!("job/{job_id}/xml"))
    }
}

#[async_trait]
impl Provider for SheetProvider {
    fn kind(&self) -> JobKind {
        JobKind::SheetGen
    }

    fn protocol(&self) -> CompletionProtocol {
        CompletionProtocol::Callback
    }

    fn validate_inputs(&self, inputs: &[String]) -> std::result::Result<(), JobError> {
        if inputs.len() != 1 {
            return Err(JobError::InvalidInput {
                reason: "sheet transcription needs exactly one audio input".into(),
            });
        }
        Ok(())
    }

    async fn submit(&self, request: SubmitRequest<'_>) -> std::result::Result<String, ProviderError> {
        let audio = read_inputs(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Rejected {
                message: "missing audio input".into(),
            })?;
        let title = request
            .title
            .map(str::to_string)
            .unwrap_or_else(|| audio.file_name.clone());

        let mut query = vec![("model", "detect".to_string()), ("title", title)];
        if let Some(callback) = &self.callback_url {
            query.push(("webhook_url", callback.clone()));
        }

        let form = reqwest::multipart::Form::new()
            .part("file", file_part(audio))
            .text("outputs", "mxml");

        let response = self
            .client
            .post(join(&self.base_url, "transcription"))
            .query(&query)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;
        let body: serde_json::Value = check_status(response).await?.json().await?;

        string_at(&body, "/job_id").ok_or_else(|| ProviderError::InvalidResponse {
            message: "transcription response has no job_id".into(),
        })
    }

    fn parse_callback(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<CallbackPayload, ProviderError> {
        let external_task_id =
            string_at(body, "/id").ok_or_else(|| ProviderError::InvalidCallback {
                message: "missing id".into(),
            })?;
        let raw_status = string_at(body, "/status").unwrap_or_default();
        let status = RemoteStatus::parse(&raw_status).unwrap_or_else(|| {
            tracing::warn!(
                external_task_id = %external_task_id,
                status = %raw_status,
                "Ignoring transcription callback with unknown status"
            );
            RemoteStatus::Pending
        });

        let (result_urls, error) = match status {
            RemoteStatus::Completed => (vec![self.result_url(&external_task_id)], None),
            RemoteStatus::Failed => (
                Vec::new(),
                Some(string_at(body, "/error").unwrap_or_else(|| UNKNOWN_PROVIDER_ERROR.into())),
            ),
            RemoteStatus::Pending => (Vec::new(), None),
        };

        Ok(CallbackPayload {
            external_task_id,
            status,
            result_urls,
            error,
        })
    }

    fn download_headers(&self) -> Vec<(String, String)> {
        vec![(API_KEY_HEADER.to_string(), self.api_key.clone())]
    }
}
