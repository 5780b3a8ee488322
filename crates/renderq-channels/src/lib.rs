//! # renderq Channels
//!
//! Lifecycle notification fan-out: one [`NotificationSystem`] receives
//! events from the workflow manager and forwards them to zero or more
//! channel handlers (realtime push, email, webhook). Per-channel failures
//! are isolated — they never touch task state or other channels.

pub mod email;
pub mod message;
pub mod realtime;
pub mod system;
pub mod webhook;

pub use email::EmailHandler;
pub use message::{Channel, NotificationMessage, NotificationType};
pub use realtime::{Connection, RealtimeHandler};
pub use system::{NotificationHandler, NotificationStats, NotificationSystem};
pub use webhook::WebhookHandler;
