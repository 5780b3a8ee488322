//! # renderq Scheduler
//!
//! Admission-controlled task scheduling for media-generation jobs.
//!
//! ## Architecture
//! ```text
//! schedule(task)
//!   ├── unmet dependencies? → parked in the waiter list
//!   └── otherwise → per-priority queue (strategy decides pop order)
//!
//! admission loop (runs on every schedule/cancel/completion event)
//!   ├── concurrency slot free?
//!   ├── strategy picks the next queued task
//!   ├── ResourceManager.acquire — all-or-nothing
//!   └── spawn execution → registered TaskProcessor
//!
//! completion (success | failure | cancel)
//!   ├── release resources
//!   ├── prune finished id from every waiter's dependency set
//!   └── promote satisfied waiters, re-run the admission loop
//! ```
//!
//! All mutable state sits behind one mutex, so resource counters are only
//! ever touched from the serialized admission/completion paths.

pub mod resources;
pub mod scheduler;
pub mod strategy;

pub use resources::{DimensionUsage, ResourceManager, ResourceRequest, ResourceUsage};
pub use scheduler::{QueueStatus, SchedulerStats, TaskProcessor, TaskScheduler};
pub use strategy::{ScheduledTask, SchedulingStrategy};
