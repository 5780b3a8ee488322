//! # renderq
//!
//! Asynchronous orchestration engine for long-running media-generation
//! tasks: priority scheduling with resource admission control, a staged
//! render pipeline behind a pluggable backend, and multi-channel lifecycle
//! notifications.
//!
//! The facade re-exports the member crates; most integrations only need
//! [`workflow::WorkflowManager`] plus an implementation of
//! [`workflow::RenderProcessor`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderq::core::config::EngineConfig;
//! use renderq::channels::NotificationSystem;
//! use renderq::workflow::WorkflowManager;
//! # use renderq::workflow::RenderProcessor;
//! # async fn example(backend: Arc<dyn RenderProcessor>) {
//! let manager = WorkflowManager::new(
//!     EngineConfig::default(),
//!     backend,
//!     Arc::new(NotificationSystem::new()),
//! );
//! manager.start().await;
//! # }
//! ```

pub use renderq_channels as channels;
pub use renderq_core as core;
pub use renderq_scheduler as scheduler;
pub use renderq_workflow as workflow;
