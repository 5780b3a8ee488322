//! Email channel — terminal-event digests via SMTP (async lettre).
//!
//! Only terminal outcomes are worth an email; everything else returns
//! `false` without contacting the relay. The recipient comes from the
//! message metadata (`recipient` key) so each task can route to its owner.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use renderq_core::config::EmailConfig;

use crate::message::{NotificationMessage, NotificationType};
use crate::system::NotificationHandler;

/// SMTP delivery for task outcome digests.
pub struct EmailHandler {
    config: EmailConfig,
}

impl EmailHandler {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Subject and body for the events this channel carries. Non-terminal
    /// events have no template and are dropped.
    fn render(&self, message: &NotificationMessage) -> Option<(String, String)> {
        let task_id = message.task_id.as_deref().unwrap_or("unknown");
        match message.kind {
            NotificationType::TaskCompleted => Some((
                format!("✅ Render complete: {task_id}"),
                format!(
                    "{}\n\nResult: {}\n",
                    message.message,
                    message.metadata["result_ref"].as_str().unwrap_or("pending")
                ),
            )),
            NotificationType::TaskFailed => Some((
                format!("❌ Render failed: {task_id}"),
                format!(
                    "{}\n\nError: {}\n",
                    message.message,
                    message.metadata["error_message"].as_str().unwrap_or("unknown")
                ),
            )),
            _ => None,
        }
    }

    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        let from_mailbox: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| format!("invalid from address: {e}"))?;
        let to_mailbox: Mailbox = to.parse().map_err(|e| format!("invalid recipient: {e}"))?;

        let email = LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| format!("build email: {e}"))?;

        let mut relay = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| format!("SMTP relay: {e}"))?
            .port(self.config.smtp_port);
        if !self.config.username.is_empty() {
            relay = relay.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        relay
            .build()
            .send(email)
            .await
            .map_err(|e| format!("SMTP send: {e}"))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationHandler for EmailHandler {
    fn is_available(&self) -> bool {
        !self.config.smtp_host.is_empty() && !self.config.from.is_empty()
    }

    async fn send(&self, message: &NotificationMessage) -> bool {
        let Some((subject, body)) = self.render(message) else {
            return false;
        };
        let Some(recipient) = message.metadata["recipient"].as_str() else {
            tracing::debug!("📭 No recipient for {} email, skipping", message.kind);
            return false;
        };

        match self.deliver(recipient, &subject, &body).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("❌ Email delivery failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "render".into(),
            password: "secret".into(),
            from: "Render Engine <noreply@example.com>".into(),
        }
    }

    fn msg(kind: NotificationType, metadata: serde_json::Value) -> NotificationMessage {
        NotificationMessage::new(kind, "t", "m", Some("task_abc123def456".into()), metadata)
    }

    #[test]
    fn test_only_terminal_events_render() {
        let handler = EmailHandler::new(config());
        assert!(handler
            .render(&msg(NotificationType::TaskCompleted, serde_json::Value::Null))
            .is_some());
        assert!(handler
            .render(&msg(NotificationType::TaskFailed, serde_json::Value::Null))
            .is_some());
        assert!(handler
            .render(&msg(NotificationType::TaskProgress, serde_json::Value::Null))
            .is_none());
        assert!(handler
            .render(&msg(NotificationType::TaskCreated, serde_json::Value::Null))
            .is_none());
    }

    #[test]
    fn test_completed_template_includes_result() {
        let handler = EmailHandler::new(config());
        let (subject, body) = handler
            .render(&msg(
                NotificationType::TaskCompleted,
                serde_json::json!({"result_ref": "/results/task_abc123def456.mp4"}),
            ))
            .unwrap();
        assert!(subject.contains("task_abc123def456"));
        assert!(body.contains("/results/task_abc123def456.mp4"));
    }

    #[test]
    fn test_availability_requires_host_and_from() {
        let mut cfg = config();
        cfg.smtp_host.clear();
        assert!(!EmailHandler::new(cfg).is_available());
        assert!(EmailHandler::new(config()).is_available());
    }

    #[tokio::test]
    async fn test_missing_recipient_is_skipped() {
        let handler = EmailHandler::new(config());
        let delivered = handler
            .send(&msg(NotificationType::TaskCompleted, serde_json::Value::Null))
            .await;
        assert!(!delivered);
    }
}
