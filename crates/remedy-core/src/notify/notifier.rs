//! Delivery backends for rendered alerts.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::alert::AlertMessage;
use crate::domain::NotifyError;

/// The single outbound "send" primitive.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError>;
}

/// Writes alerts to the tracing log. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        info!(event = "alert", title = %message.title, "\n{}", message.body);
        Ok(())
    }
}

/// POSTs `{"title": .., "body": ..}` as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "webhook rejected alert");
            return Err(NotifyError::Delivery(format!(
                "webhook returned {status}: {body}"
            )));
        }
        Ok(())
    }
}
