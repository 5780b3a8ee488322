//! # renderq Workflow
//!
//! The workflow manager ties the engine together: it owns the canonical
//! task records, drives the staged render pipeline through the scheduler,
//! and emits lifecycle notifications.
//!
//! ## Architecture
//! ```text
//! create_task(config, priority, metadata)
//!   → validate → TaskContext (Pending) → estimate duration + resources
//!     → TaskScheduler.schedule
//!       → admission → pipeline:
//!         Processing (0.2) → Generating (0.5) → Rendering (0.8) → Completed (1.0)
//!       → every transition: update_status chokepoint → notifications + listeners
//! ```
//!
//! The actual media work lives behind [`RenderProcessor`]; this crate only
//! orchestrates it.

pub mod manager;
pub mod processor;

pub use manager::{WorkflowManager, WorkflowStatistics};
pub use processor::{RenderProcessor, TaskListener};
