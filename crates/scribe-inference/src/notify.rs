//! Completion notification adapters.
//!
//! Notification is best-effort: the orchestrator logs failures and never
//! rolls back pipeline state because of them.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use scribe_core::{defaults, AdapterError, AdapterResult, Notifier};

/// [`Notifier`] that POSTs note completion to a webhook with an optional
/// bearer token (e.g. a Home Assistant persistent notification service).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
            timeout: Duration::from_secs(defaults::NOTIFY_TIMEOUT_SECS),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, note_id: Uuid, summary: &str) -> AdapterResult<()> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({
                "title": "Note ready",
                "message": summary,
                "note_id": note_id,
            }))
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status.as_u16(), body));
        }

        debug!(%note_id, "Delivered completion notification");
        Ok(())
    }
}

/// No-op notifier for deployments without a notification channel.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, note_id: Uuid, _summary: &str) -> AdapterResult<()> {
        debug!(%note_id, "Notification channel disabled; skipping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_notifier_always_succeeds() {
        let notifier = NullNotifier;
        notifier.notify(Uuid::new_v4(), "summary").await.unwrap();
    }
}
