//! The notification system — registers channel handlers, keeps a bounded
//! history, and fans each event out with per-channel fault isolation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use renderq_core::task::TaskInfo;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::message::{Channel, NotificationMessage, NotificationType};

/// History ring buffer capacity.
const MAX_HISTORY: usize = 1000;

/// One delivery mechanism. Handlers must never panic; a failed delivery is
/// a `false` return.
#[async_trait::async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Whether the handler is currently able to deliver anything.
    fn is_available(&self) -> bool;

    /// Deliver one message. Errors stay inside the handler.
    async fn send(&self, message: &NotificationMessage) -> bool;
}

/// Delivery counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationStats {
    pub total_sent: u64,
    pub sent_by_type: HashMap<String, u64>,
    pub sent_by_channel: HashMap<String, u64>,
}

#[derive(Default)]
struct SystemState {
    handlers: HashMap<Channel, Arc<dyn NotificationHandler>>,
    history: VecDeque<NotificationMessage>,
    stats: NotificationStats,
}

/// Fan-out hub for lifecycle events.
#[derive(Default)]
pub struct NotificationSystem {
    state: Mutex<SystemState>,
}

impl NotificationSystem {
    pub fn new() -> Self {
        tracing::info!("📮 NotificationSystem initialized");
        Self::default()
    }

    pub async fn add_handler(&self, channel: Channel, handler: Arc<dyn NotificationHandler>) {
        tracing::info!("➕ Registered {channel} notification handler");
        self.state.lock().await.handlers.insert(channel, handler);
    }

    pub async fn remove_handler(&self, channel: Channel) {
        if self.state.lock().await.handlers.remove(&channel).is_some() {
            tracing::info!("➖ Removed {channel} notification handler");
        }
    }

    /// Build a message, record it in history, and deliver it to the target
    /// channels (all registered channels when `channels` is `None`). One
    /// channel failing has no effect on the others or on the caller.
    pub async fn send(
        &self,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        task_id: Option<String>,
        channels: Option<Vec<Channel>>,
        metadata: serde_json::Value,
    ) -> HashMap<Channel, bool> {
        let notification = NotificationMessage::new(kind, title, message, task_id, metadata);

        let (targets, handlers) = {
            let mut state = self.state.lock().await;
            state.history.push_back(notification.clone());
            while state.history.len() > MAX_HISTORY {
                state.history.pop_front();
            }
            state.stats.total_sent += 1;
            *state.stats.sent_by_type.entry(kind.to_string()).or_default() += 1;

            let targets: Vec<Channel> =
                channels.unwrap_or_else(|| state.handlers.keys().copied().collect());
            let handlers: Vec<(Channel, Option<Arc<dyn NotificationHandler>>)> = targets
                .iter()
                .map(|c| (*c, state.handlers.get(c).cloned()))
                .collect();
            (targets, handlers)
        };

        let mut results = HashMap::with_capacity(targets.len());
        for (channel, handler) in handlers {
            let delivered = match handler {
                Some(handler) if handler.is_available() => handler.send(&notification).await,
                _ => false,
            };
            if delivered {
                let mut state = self.state.lock().await;
                *state
                    .stats
                    .sent_by_channel
                    .entry(channel.to_string())
                    .or_default() += 1;
            } else {
                tracing::debug!("📭 {channel} delivery skipped/failed for {kind}");
            }
            results.insert(channel, delivered);
        }

        tracing::debug!("📣 Sent {kind} notification: {}", notification.title);
        results
    }

    /// Last `limit` notifications, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<NotificationMessage> {
        let state = self.state.lock().await;
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    pub async fn stats(&self) -> NotificationStats {
        self.state.lock().await.stats.clone()
    }

    // Lifecycle convenience wrappers. Terminal events go to every channel;
    // progress stays on the realtime channel only.

    pub async fn notify_task_created(&self, info: &TaskInfo) {
        self.send(
            NotificationType::TaskCreated,
            format!("Task Created: {}", info.id),
            "Generation task has been created and queued for processing.",
            Some(info.id.clone()),
            None,
            serde_json::json!({"status": info.status.to_string()}),
        )
        .await;
    }

    pub async fn notify_task_started(&self, info: &TaskInfo) {
        self.send(
            NotificationType::TaskStarted,
            format!("Task Started: {}", info.id),
            "Generation has begun for your task.",
            Some(info.id.clone()),
            None,
            serde_json::json!({"status": info.status.to_string()}),
        )
        .await;
    }

    pub async fn notify_task_progress(&self, info: &TaskInfo) {
        let percent = (info.progress * 100.0).round() as u32;
        self.send(
            NotificationType::TaskProgress,
            format!("Task Progress: {}", info.id),
            format!("Generation is {percent}% complete."),
            Some(info.id.clone()),
            Some(vec![Channel::Realtime]),
            serde_json::json!({"progress": info.progress, "progress_percent": percent}),
        )
        .await;
    }

    pub async fn notify_task_completed(&self, info: &TaskInfo) {
        self.send(
            NotificationType::TaskCompleted,
            format!("Task Completed: {}", info.id),
            "Your output has been generated successfully!",
            Some(info.id.clone()),
            None,
            serde_json::json!({"result_ref": info.result_ref}),
        )
        .await;
    }

    pub async fn notify_task_failed(&self, info: &TaskInfo) {
        let reason = info.error_message.clone().unwrap_or_else(|| "unknown error".into());
        self.send(
            NotificationType::TaskFailed,
            format!("Task Failed: {}", info.id),
            format!("Generation failed: {reason}"),
            Some(info.id.clone()),
            None,
            serde_json::json!({"error_message": reason}),
        )
        .await;
    }

    pub async fn notify_task_cancelled(&self, info: &TaskInfo) {
        self.send(
            NotificationType::TaskCancelled,
            format!("Task Cancelled: {}", info.id),
            "Generation task has been cancelled.",
            Some(info.id.clone()),
            None,
            serde_json::Value::Null,
        )
        .await;
    }

    pub async fn notify_system_alert(&self, title: &str, message: &str) {
        self.send(
            NotificationType::SystemAlert,
            title,
            message,
            None,
            None,
            serde_json::Value::Null,
        )
        .await;
    }
}
