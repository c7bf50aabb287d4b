//! Shared HTTP plumbing for the provider adapters

use crate::artifacts::InputArtifact;
use crate::config::ProviderEndpoint;
use crate::error::{Error, ProviderError, Result};
use crate::provider::SubmitRequest;

pub(super) fn build_client(endpoint: &ProviderEndpoint) -> Result<reqwest::Client> {
    url::Url::parse(&endpoint.base_url).map_err(|e| Error::Config {
        message: format!("invalid provider base_url {}: {e}", endpoint.base_url),
        key: Some("providers.base_url".into()),
    })?;
    reqwest::Client::builder()
        .timeout(endpoint.request_timeout)
        .build()
        .map_err(Error::Network)
}

pub(super) fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-2xx answer into a provider error; 5xx is treated as unreachable
pub(super) async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200))
    };
    if status.is_server_error() {
        Err(ProviderError::Unreachable { message })
    } else {
        Err(ProviderError::Rejected { message })
    }
}

pub(super) async fn read_inputs(
    request: &SubmitRequest<'_>,
) -> std::result::Result<Vec<InputArtifact>, ProviderError> {
    let mut inputs = Vec::with_capacity(request.inputs.len());
    for reference in request.inputs {
        let input = request
            .store
            .read_input(reference)
            .await
            .map_err(|e| ProviderError::Rejected {
                message: format!("cannot read input {reference}: {e}"),
            })?;
        inputs.push(input);
    }
    Ok(inputs)
}

pub(super) fn file_part(input: InputArtifact) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(input.bytes).file_name(input.file_name)
}

/// Read a non-empty string field at `pointer`, accepting numbers too
pub(super) fn string_at(body: &serde_json::Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
