//! Outbound notification webhooks.

use crate::config::WebhookEvent;
use crate::types::{Event, JobReport, WebhookPayload};
use std::sync::Arc;

use super::JobEngine;

impl JobEngine {
    /// Notify configured webhooks about a terminal transition
    ///
    /// Fire and forget: delivery runs in its own task, bounded by each webhook's
    /// timeout, and failures surface only as [`Event::WebhookFailed`].
    pub(crate) fn notify(&self, event_type: WebhookEvent, report: &JobReport) {
        let matching_webhooks: Vec<_> = self
            .config
            .notifications
            .webhooks
            .iter()
            .filter(|w| w.events.contains(&event_type))
            .cloned()
            .collect();

        if matching_webhooks.is_empty() {
            return;
        }

        let event_str: &'static str = match event_type {
            WebhookEvent::OnComplete => "complete",
            WebhookEvent::OnFailed => "failed",
            WebhookEvent::OnCancelled => "cancelled",
        };
        let payload = Arc::new(WebhookPayload {
            event: event_str.to_string(),
            job_id: report.id,
            kind: report.kind,
            status: report.status,
            result_url: report.result_url.clone(),
            error: report.error_message.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        });
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let client = reqwest::Client::new();

            for webhook in matching_webhooks {
                let mut request = client
                    .post(&webhook.url)
                    .json(payload.as_ref())
                    .timeout(webhook.timeout);
                if let Some(auth) = &webhook.auth_header {
                    request = request.header("Authorization", auth);
                }

                let url = webhook.url;
                let timeout = webhook.timeout;
                let error_msg = match tokio::time::timeout(timeout, request.send()).await {
                    Ok(Ok(response)) if response.status().is_success() => {
                        tracing::debug!(url = %url, job_id = payload.job_id.0, "webhook sent");
                        continue;
                    }
                    Ok(Ok(response)) => format!(
                        "Webhook returned status {}: {}",
                        response.status(),
                        response.text().await.unwrap_or_default()
                    ),
                    Ok(Err(e)) => format!("Failed to send webhook: {}", e),
                    Err(_) => format!("Webhook timed out after {:?}", timeout),
                };

                tracing::warn!(url = %url, error = %error_msg, "webhook failed");
                event_tx
                    .send(Event::WebhookFailed {
                        url,
                        error: error_msg,
                    })
                    .ok();
            }
        });
    }
}
