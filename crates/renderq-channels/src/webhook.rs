//! Webhook channel — POSTs the shared JSON payload to configured endpoints.

use std::time::Duration;

use renderq_core::config::WebhookConfig;

use crate::message::NotificationMessage;
use crate::system::NotificationHandler;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP POST fan-out over the configured endpoint list. Delivery succeeds
/// when at least one endpoint accepts the payload.
pub struct WebhookHandler {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<(), String> {
        let mut req = self.client.post(url).json(payload).timeout(SEND_TIMEOUT);
        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req.send().await.map_err(|e| format!("send failed: {e}"))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("endpoint returned {}", resp.status()))
        }
    }
}

#[async_trait::async_trait]
impl NotificationHandler for WebhookHandler {
    fn is_available(&self) -> bool {
        !self.config.urls.is_empty()
    }

    async fn send(&self, message: &NotificationMessage) -> bool {
        let payload = message.to_json();
        let mut any_accepted = false;

        for url in &self.config.urls {
            match self.post(url, &payload).await {
                Ok(()) => {
                    tracing::info!("✅ Webhook notification sent to {url}: {}", message.title);
                    any_accepted = true;
                }
                Err(e) => tracing::warn!("⚠️ Webhook {url}: {e}"),
            }
        }

        any_accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_requires_urls() {
        let empty = WebhookHandler::new(WebhookConfig::default());
        assert!(!empty.is_available());

        let configured = WebhookHandler::new(WebhookConfig {
            urls: vec!["https://example.com/hook".into()],
            headers: vec![],
        });
        assert!(configured.is_available());
    }

    #[tokio::test]
    async fn test_no_endpoints_means_no_delivery() {
        let handler = WebhookHandler::new(WebhookConfig::default());
        let msg = NotificationMessage::new(
            crate::message::NotificationType::SystemAlert,
            "t",
            "m",
            None,
            serde_json::Value::Null,
        );
        assert!(!handler.send(&msg).await);
    }
}
