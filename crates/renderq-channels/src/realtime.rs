//! Realtime push channel — an in-process connection registry.
//!
//! Consumers (a UI gateway, a test harness) register a connection backed by
//! an unbounded mpsc sender and optionally narrow it with subscription
//! filters. A connection with no filters receives everything. Endpoints
//! whose receiving half is gone are pruned during send.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::message::{NotificationMessage, NotificationType};
use crate::system::NotificationHandler;

/// One subscribed endpoint.
pub struct Connection {
    pub id: String,
    sender: mpsc::UnboundedSender<serde_json::Value>,
    subscribed_tasks: HashSet<String>,
    subscribed_types: HashSet<NotificationType>,
}

impl Connection {
    /// Whether this connection wants the message: no filters means
    /// deliver-all, otherwise any filter match suffices.
    fn wants(&self, message: &NotificationMessage) -> bool {
        if self.subscribed_tasks.is_empty() && self.subscribed_types.is_empty() {
            return true;
        }
        if let Some(task_id) = &message.task_id {
            if self.subscribed_tasks.contains(task_id) {
                return true;
            }
        }
        self.subscribed_types.contains(&message.kind)
    }
}

/// Push handler over the connection registry.
#[derive(Default)]
pub struct RealtimeHandler {
    connections: Mutex<HashMap<String, Connection>>,
}

impl RealtimeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and get the receiving half.
    pub async fn connect(&self, id: impl Into<String>) -> mpsc::UnboundedReceiver<serde_json::Value> {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::info!("🔌 Realtime connection added: {id}");
        self.connections.lock().await.insert(
            id.clone(),
            Connection {
                id,
                sender: tx,
                subscribed_tasks: HashSet::new(),
                subscribed_types: HashSet::new(),
            },
        );
        rx
    }

    pub async fn disconnect(&self, id: &str) {
        if self.connections.lock().await.remove(id).is_some() {
            tracing::info!("🔌 Realtime connection removed: {id}");
        }
    }

    /// Narrow a connection to one task's events. Returns false if the
    /// connection is unknown.
    pub async fn subscribe_task(&self, connection_id: &str, task_id: impl Into<String>) -> bool {
        match self.connections.lock().await.get_mut(connection_id) {
            Some(conn) => {
                conn.subscribed_tasks.insert(task_id.into());
                true
            }
            None => false,
        }
    }

    /// Narrow a connection to one notification type.
    pub async fn subscribe_type(&self, connection_id: &str, kind: NotificationType) -> bool {
        match self.connections.lock().await.get_mut(connection_id) {
            Some(conn) => {
                conn.subscribed_types.insert(kind);
                true
            }
            None => false,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }
}

#[async_trait::async_trait]
impl NotificationHandler for RealtimeHandler {
    fn is_available(&self) -> bool {
        // Registration itself is cheap and the registry may legitimately be
        // empty between connects; sends to nobody simply deliver to nobody.
        true
    }

    async fn send(&self, message: &NotificationMessage) -> bool {
        let payload = message.to_json();
        let mut connections = self.connections.lock().await;
        let mut dead: Vec<String> = Vec::new();
        let mut delivered = 0usize;

        for conn in connections.values() {
            if !conn.wants(message) {
                continue;
            }
            if conn.sender.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(conn.id.clone());
            }
        }

        for id in dead {
            tracing::debug!("🧹 Pruning disconnected realtime endpoint {id}");
            connections.remove(&id);
        }

        delivered > 0 || connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::NotificationMessage;

    fn msg(kind: NotificationType, task_id: Option<&str>) -> NotificationMessage {
        NotificationMessage::new(kind, "t", "m", task_id.map(String::from), serde_json::Value::Null)
    }

    #[tokio::test]
    async fn test_unfiltered_connection_gets_everything() {
        let handler = RealtimeHandler::new();
        let mut rx = handler.connect("c1").await;

        assert!(handler.send(&msg(NotificationType::TaskProgress, Some("task_a"))).await);
        assert!(handler.send(&msg(NotificationType::SystemAlert, None)).await);

        assert_eq!(rx.recv().await.unwrap()["type"], "task_progress");
        assert_eq!(rx.recv().await.unwrap()["type"], "system_alert");
    }

    #[tokio::test]
    async fn test_task_filter() {
        let handler = RealtimeHandler::new();
        let mut rx = handler.connect("c1").await;
        assert!(handler.subscribe_task("c1", "task_wanted").await);

        handler.send(&msg(NotificationType::TaskProgress, Some("task_other"))).await;
        handler.send(&msg(NotificationType::TaskProgress, Some("task_wanted"))).await;

        let got = rx.recv().await.unwrap();
        assert_eq!(got["task_id"], "task_wanted");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_type_filter() {
        let handler = RealtimeHandler::new();
        let mut rx = handler.connect("c1").await;
        assert!(handler.subscribe_type("c1", NotificationType::TaskFailed).await);

        handler.send(&msg(NotificationType::TaskProgress, Some("task_a"))).await;
        handler.send(&msg(NotificationType::TaskFailed, Some("task_a"))).await;

        assert_eq!(rx.recv().await.unwrap()["type"], "task_failed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_connection_pruned() {
        let handler = RealtimeHandler::new();
        let rx = handler.connect("dead").await;
        drop(rx);
        let mut alive = handler.connect("alive").await;

        handler.send(&msg(NotificationType::SystemAlert, None)).await;
        assert_eq!(handler.connection_count().await, 1);
        assert!(alive.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_connection() {
        let handler = RealtimeHandler::new();
        assert!(!handler.subscribe_task("ghost", "task_a").await);
        assert!(!handler.subscribe_type("ghost", NotificationType::SystemAlert).await);
    }
}
