//! # renderq Core
//!
//! Shared data model for the renderq orchestration engine: task lifecycle
//! types, generation request configuration, quality assessment results,
//! engine configuration, and the error taxonomy.
//!
//! Everything here is plain data — the moving parts live in
//! `renderq-scheduler`, `renderq-workflow`, and `renderq-channels`.

pub mod config;
pub mod error;
pub mod media;
pub mod quality;
pub mod task;
pub mod task_id;

pub use config::{EngineConfig, NotifyConfig, QualityConfig, ResourceConfig, SchedulerConfig};
pub use error::{EngineError, Result};
pub use media::{AspectRatio, AudioSettings, RenderConfig, RenderQuality, Scene, TextOverlay};
pub use quality::{QualityAssessment, RenderSettings};
pub use task::{TaskContext, TaskInfo, TaskPriority, TaskStatus};
