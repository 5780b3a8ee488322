//! Task lifecycle types — the canonical state machine and per-task records.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::RenderConfig;

/// Canonical task status.
///
/// Legal transitions:
/// `Pending → Processing → Generating → Rendering → Completed`, with
/// `Failed` and `Cancelled` reachable from any non-terminal state. No
/// transition leaves a terminal state; `Failed → Pending` happens only
/// through an explicit retry ([`TaskInfo::reset_for_retry`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Generating,
    Rendering,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Whether a task in this status counts against the concurrency ceiling.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Processing | TaskStatus::Generating | TaskStatus::Rendering
        )
    }

    /// Exhaustive transition table. Retry (`Failed → Pending`) is not an
    /// edge here; it goes through [`TaskInfo::reset_for_retry`].
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (*self, to) {
            // Forward pipeline edges.
            (Pending, Processing) => true,
            (Processing, Generating) => true,
            (Generating, Rendering) => true,
            (Rendering, Completed) => true,
            // Failure and cancellation from any non-terminal state.
            (Pending | Processing | Generating | Rendering, Failed) => true,
            (Pending | Processing | Generating | Rendering, Cancelled) => true,
            // Everything else, including any exit from a terminal state.
            (Completed | Failed | Cancelled, _) => false,
            (Pending, Generating | Rendering | Completed | Pending) => false,
            (Processing, Processing | Pending | Rendering | Completed) => false,
            (Generating, Generating | Pending | Processing | Completed) => false,
            (Rendering, Rendering | Pending | Processing | Generating) => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Generating => "generating",
            TaskStatus::Rendering => "rendering",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Task priority for queue management. Higher wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl TaskPriority {
    /// All priorities, highest first. Selection order for the scheduler.
    pub const DESCENDING: [TaskPriority; 4] = [
        TaskPriority::Urgent,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
    ];
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskPriority::Low => "low",
            TaskPriority::Normal => "normal",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

/// Canonical record for one generation task. Owned by the workflow manager
/// and mutated only through its update methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Unique id (`task_` + 12 hex chars).
    pub id: String,
    pub status: TaskStatus,
    /// Progress in `[0, 1]`, monotonically non-decreasing within a run.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: RenderConfig,
    /// Reference to the produced output, set on completion.
    pub result_ref: Option<String>,
    /// Human-readable failure reason, set when status is `Failed`.
    pub error_message: Option<String>,
}

impl TaskInfo {
    /// Fresh record in `Pending` with zero progress.
    pub fn new(id: String, config: RenderConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            progress: 0.0,
            created_at: now,
            updated_at: now,
            config,
            result_ref: None,
            error_message: None,
        }
    }

    /// Structural sanity check.
    pub fn validate(&self) -> bool {
        crate::task_id::is_valid(&self.id)
            && (0.0..=1.0).contains(&self.progress)
            && self.config.validate()
    }

    /// The only path out of `Failed`: back to `Pending` with progress reset.
    /// Returns false (and leaves the record untouched) for any other status.
    pub fn reset_for_retry(&mut self) -> bool {
        if self.status != TaskStatus::Failed {
            return false;
        }
        self.status = TaskStatus::Pending;
        self.progress = 0.0;
        self.error_message = None;
        self.updated_at = Utc::now();
        true
    }
}

/// Extended execution context wrapped around a [`TaskInfo`]. One per task,
/// created at submission, kept for the task's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub info: TaskInfo,
    pub priority: TaskPriority,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Ids this task must wait for before it may run.
    pub dependencies: HashSet<String>,
    /// Caller-supplied metadata, carried into notifications.
    pub metadata: serde_json::Value,
}

impl TaskContext {
    pub fn new(info: TaskInfo, priority: TaskPriority, max_retries: u32) -> Self {
        Self {
            info,
            priority,
            retry_count: 0,
            max_retries,
            dependencies: HashSet::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Whether another retry is allowed.
    pub fn can_retry(&self) -> bool {
        self.info.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }
}
