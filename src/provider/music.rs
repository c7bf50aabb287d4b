//! Music generation provider (callback-based)
//!
//! Submission posts a JSON generate request with a bearer key and answers
//! `{"code": 200, "data": {"taskId": ...}}`. Results arrive as callbacks shaped
//! `{"code", "msg", "data": {"callbackType", "task_id", "data": [{"audio_url", ...}]}}`.

use super::http::{build_client, check_status, join, string_at};
use super::{
    CallbackPayload, CompletionProtocol, Provider, RemoteStatus, SubmitRequest,
    UNKNOWN_PROVIDER_ERROR,
};
use crate::config::ProviderEndpoint;
use crate::error::{JobError, ProviderError, Result};
use crate::types::JobKind;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    prompt: &'a str,
    title: &'a str,
    custom_mode: bool,
    instrumental: bool,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_back_url: Option<&'a str>,
}

/// HTTP adapter for the music generation service
#[derive(Clone, Debug)]
pub struct MusicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    callback_url: Option<String>,
}

impl MusicProvider {
    /// Adapter for the given endpoint
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint)?,
            base_url: endpoint.base_url.clone(),
            api_key: endpoint.api_key.clone(),
            callback_url: endpoint.callback_url.clone(),
        })
    }
}

fn response_code(body: &serde_json::Value) -> Option<i64> {
    body.get("code").and_then(serde_json::Value::as_i64)
}

#[async_trait]
impl Provider for MusicProvider {
    fn kind(&self) -> JobKind {
        JobKind::MusicGen
    }

    fn protocol(&self) -> CompletionProtocol {
        CompletionProtocol::Callback
    }

    fn validate_inputs(&self, inputs: &[String]) -> std::result::Result<(), JobError> {
        match inputs.first() {
            Some(prompt) if !prompt.trim().is_empty() => Ok(()),
            _ => Err(JobError::InvalidInput {
                reason: "music generation needs a prompt as its first input".into(),
            }),
        }
    }

    async fn submit(&self, request: SubmitRequest<'_>) -> std::result::Result<String, ProviderError> {
        let prompt = request
            .inputs
            .first()
            .ok_or_else(|| ProviderError::Rejected {
                message: "missing prompt".into(),
            })?;
        let body = GenerateRequest {
            prompt,
            title: request.title.unwrap_or("Generate Music"),
            custom_mode: true,
            instrumental: true,
            model: "V5",
            call_back_url: self.callback_url.as_deref(),
        };

        let mut http = self.client.post(join(&self.base_url, "generate")).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        let answer: serde_json::Value = check_status(http.send().await?).await?.json().await?;

        if let Some(code) = response_code(&answer).filter(|c| *c != 200) {
            return Err(ProviderError::Rejected {
                message: string_at(&answer, "/msg").unwrap_or_else(|| format!("code {code}")),
            });
        }
        string_at(&answer, "/data/taskId").ok_or_else(|| ProviderError::InvalidResponse {
            message: "music generation response has no data.taskId".into(),
        })
    }

    fn parse_callback(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<CallbackPayload, ProviderError> {
        let external_task_id = string_at(body, "/data/task_id")
            .or_else(|| string_at(body, "/data/taskId"))
            .ok_or_else(|| ProviderError::InvalidCallback {
                message: "missing data.task_id".into(),
            })?;

        let code = response_code(body).unwrap_or(200);
        let callback_type = string_at(body, "/data/callbackType")
            .unwrap_or_else(|| "complete".into())
            .to_ascii_lowercase();

        if code != 200 || callback_type == "error" {
            return Ok(CallbackPayload {
                external_task_id,
                status: RemoteStatus::Failed,
                result_urls: Vec::new(),
                error: Some(string_at(body, "/msg").unwrap_or_else(|| UNKNOWN_PROVIDER_ERROR.into())),
            });
        }

        if callback_type != "complete" {
            // "text" and "first" callbacks precede the final one
            return Ok(CallbackPayload {
                external_task_id,
                status: RemoteStatus::Pending,
                result_urls: Vec::new(),
                error: None,
            });
        }

        let result_urls = body
            .pointer("/data/data")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| string_at(item, "/audio_url"))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CallbackPayload {
            external_task_id,
            status: RemoteStatus::Completed,
            result_urls,
            error: None,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::LocalArtifactStore;
    use crate::types::JobId;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> MusicProvider {
        let mut endpoint = ProviderEndpoint::new(base);
        endpoint.api_key = Some("suno-key".into());
        endpoint.callback_url = Some("https://app.example.com/callbacks/music_gen".into());
        MusicProvider::new(&endpoint).unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_prompt_and_callback_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("authorization", "Bearer suno-key"))
            .and(body_partial_json(json!({
                "prompt": "folk melody with rice drum",
                "callBackUrl": "https://app.example.com/callbacks/music_gen"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 200, "data": {"taskId": "suno-1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), None).await.unwrap();
        let inputs = vec!["folk melody with rice drum".to_string()];
        let id = provider(&server.uri())
            .submit(SubmitRequest {
                job_id: JobId(1),
                inputs: &inputs,
                title: None,
                store: &store,
            })
            .await
            .unwrap();
        assert_eq!(id, "suno-1");
    }

    #[tokio::test]
    async fn test_submit_with_error_code_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 429, "msg": "insufficient credits"})),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), None).await.unwrap();
        let inputs = vec!["prompt".to_string()];
        let err = provider(&server.uri())
            .submit(SubmitRequest {
                job_id: JobId(1),
                inputs: &inputs,
                title: None,
                store: &store,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::Rejected {
                message: "insufficient credits".into()
            }
        );
    }

    #[test]
    fn test_complete_callback_keeps_url_order() {
        let payload = provider("http://localhost")
            .parse_callback(&json!({
                "code": 200,
                "msg": "All generated successfully.",
                "data": {
                    "callbackType": "complete",
                    "task_id": "suno-1",
                    "data": [
                        {"id": "a", "audio_url": "https://cdn/a.mp3"},
                        {"id": "b", "audio_url": "https://cdn/b.mp3"}
                    ]
                }
            }))
            .unwrap();

        assert_eq!(payload.external_task_id, "suno-1");
        assert_eq!(payload.status, RemoteStatus::Completed);
        assert_eq!(payload.result_urls, vec!["https://cdn/a.mp3", "https://cdn/b.mp3"]);
    }

    #[test]
    fn test_error_code_callback_uses_msg() {
        let payload = provider("http://localhost")
            .parse_callback(&json!({
                "code": 531,
                "msg": "insufficient credits",
                "data": {"callbackType": "error", "task_id": "suno-2", "data": null}
            }))
            .unwrap();
        assert_eq!(payload.status, RemoteStatus::Failed);
        assert_eq!(payload.error.as_deref(), Some("insufficient credits"));
    }

    #[test]
    fn test_failed_callback_without_msg_is_unknown_error() {
        let payload = provider("http://localhost")
            .parse_callback(&json!({"code": 500, "data": {"task_id": "suno-3"}}))
            .unwrap();
        assert_eq!(payload.error.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn test_intermediate_callback_is_pending() {
        let payload = provider("http://localhost")
            .parse_callback(&json!({
                "code": 200,
                "data": {"callbackType": "first", "task_id": "suno-4", "data": []}
            }))
            .unwrap();
        assert_eq!(payload.status, RemoteStatus::Pending);
    }

    #[test]
    fn test_callback_without_task_id_is_invalid() {
        let err = provider("http://localhost")
            .parse_callback(&json!({"code": 200, "data": {}}))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCallback { .. }));
    }

    #[test]
    fn test_polling_is_not_supported() {
        let p = provider("http://localhost");
        let err = futures::executor::block_on(p.poll_status("x")).unwrap_err();
        assert_eq!(
            err,
            ProviderError::NotPollable {
                kind: JobKind::MusicGen
            }
        );
    }
}
