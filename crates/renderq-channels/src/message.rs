//! Notification payloads — immutable once constructed, with a stable JSON
//! shape shared by every channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle and system events that produce notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TaskCreated,
    TaskStarted,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    SystemAlert,
    /// Resource-pressure alert. The engine never raises this on its own;
    /// it is reserved for operators reporting pool pressure through
    /// `NotificationSystem::send`.
    ResourceWarning,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationType::TaskCreated => "task_created",
            NotificationType::TaskStarted => "task_started",
            NotificationType::TaskProgress => "task_progress",
            NotificationType::TaskCompleted => "task_completed",
            NotificationType::TaskFailed => "task_failed",
            NotificationType::TaskCancelled => "task_cancelled",
            NotificationType::SystemAlert => "system_alert",
            NotificationType::ResourceWarning => "resource_warning",
        };
        write!(f, "{s}")
    }
}

/// Delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// In-process realtime push — the only channel that carries
    /// high-frequency progress events.
    Realtime,
    Email,
    Webhook,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Channel::Realtime => "realtime",
            Channel::Email => "email",
            Channel::Webhook => "webhook",
        };
        write!(f, "{s}")
    }
}

/// One notification. Immutable after construction; retained in the
/// system's bounded history for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NotificationMessage {
    pub fn new(
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        task_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            task_id,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// The wire payload every channel agrees on:
    /// `{type, title, message, task_id, timestamp (ISO-8601), metadata}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.kind.to_string(),
            "title": self.title,
            "message": self.message,
            "task_id": self.task_id,
            "timestamp": self.timestamp.to_rfc3339(),
            "metadata": self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let msg = NotificationMessage::new(
            NotificationType::TaskCompleted,
            "Task Completed",
            "done",
            Some("task_abc123def456".into()),
            serde_json::json!({"result_ref": "/results/x.mp4"}),
        );
        let json = msg.to_json();
        assert_eq!(json["type"], "task_completed");
        assert_eq!(json["task_id"], "task_abc123def456");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(json["metadata"]["result_ref"], "/results/x.mp4");
    }

    #[test]
    fn test_null_task_id_serializes() {
        let msg = NotificationMessage::new(
            NotificationType::SystemAlert,
            "Alert",
            "resource pressure",
            None,
            serde_json::Value::Null,
        );
        assert!(msg.to_json()["task_id"].is_null());
    }
}
