//! Scheduling strategies and the per-priority queue set they select from.
//!
//! Buckets are `VecDeque`s appended in arrival order, so every bucket is
//! `created_at`-ordered and a front pop is always the oldest entry. That
//! makes the Priority strategy a true `(priority desc, created_at asc)` pop
//! in all cases, with no length-dependent special casing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use renderq_core::task::TaskPriority;
use serde::{Deserialize, Serialize};

use crate::resources::ResourceRequest;

/// Policy for picking the next queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// Earliest submission wins, priority ignored.
    Fifo,
    /// Highest priority bucket first, earliest submission within a bucket.
    Priority,
    /// Cycle through priority buckets in fixed order.
    RoundRobin,
    /// Smallest known estimated duration wins; tasks without an estimate
    /// fall back to Priority ordering.
    ShortestJobFirst,
}

impl std::fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchedulingStrategy::Fifo => "fifo",
            SchedulingStrategy::Priority => "priority",
            SchedulingStrategy::RoundRobin => "round_robin",
            SchedulingStrategy::ShortestJobFirst => "shortest_job_first",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fifo" => Ok(SchedulingStrategy::Fifo),
            "priority" => Ok(SchedulingStrategy::Priority),
            "round_robin" => Ok(SchedulingStrategy::RoundRobin),
            "shortest_job_first" => Ok(SchedulingStrategy::ShortestJobFirst),
            other => Err(format!("unknown scheduling strategy: {other}")),
        }
    }
}

/// A task as the scheduler sees it. Exists only while queued or waiting;
/// removed on admission or cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: String,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    /// Estimated execution time in seconds, when known.
    pub estimated_duration: Option<f64>,
    /// Unmet dependency ids. Pruned as dependencies finish.
    pub dependencies: HashSet<String>,
    pub resources: ResourceRequest,
}

impl ScheduledTask {
    pub fn new(task_id: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            task_id: task_id.into(),
            priority,
            created_at: Utc::now(),
            estimated_duration: None,
            dependencies: HashSet::new(),
            resources: ResourceRequest::default(),
        }
    }

    /// Whether this task should be admitted before `other`:
    /// higher priority first, then earlier submission.
    pub fn runs_before(&self, other: &ScheduledTask) -> bool {
        if self.priority != other.priority {
            return self.priority > other.priority;
        }
        self.created_at < other.created_at
    }
}

/// Per-priority queues plus round-robin cursor state.
#[derive(Debug, Default)]
pub struct QueueSet {
    buckets: HashMap<TaskPriority, VecDeque<ScheduledTask>>,
    rr_cursor: usize,
}

impl QueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append in arrival order.
    pub fn push(&mut self, task: ScheduledTask) {
        self.buckets.entry(task.priority).or_default().push_back(task);
    }

    /// Return a task to the head of its bucket, keeping its original
    /// position. Used when resource acquisition fails after selection.
    pub fn push_front(&mut self, task: ScheduledTask) {
        self.buckets.entry(task.priority).or_default().push_front(task);
    }

    /// Pop the next task under the given strategy.
    pub fn pop_next(&mut self, strategy: SchedulingStrategy) -> Option<ScheduledTask> {
        match strategy {
            SchedulingStrategy::Fifo => self.pop_fifo(),
            SchedulingStrategy::Priority => self.pop_priority(),
            SchedulingStrategy::RoundRobin => self.pop_round_robin(),
            SchedulingStrategy::ShortestJobFirst => self.pop_shortest_job(),
        }
    }

    fn pop_fifo(&mut self) -> Option<ScheduledTask> {
        let oldest = TaskPriority::DESCENDING
            .iter()
            .filter_map(|p| self.buckets.get(p).and_then(|q| q.front()).map(|t| (*p, t.created_at)))
            .min_by_key(|(_, created)| *created)?;
        self.buckets.get_mut(&oldest.0).and_then(|q| q.pop_front())
    }

    fn pop_priority(&mut self) -> Option<ScheduledTask> {
        for priority in TaskPriority::DESCENDING {
            if let Some(task) = self.buckets.get_mut(&priority).and_then(|q| q.pop_front()) {
                return Some(task);
            }
        }
        None
    }

    fn pop_round_robin(&mut self) -> Option<ScheduledTask> {
        let order = TaskPriority::DESCENDING;
        for offset in 0..order.len() {
            let idx = (self.rr_cursor + offset) % order.len();
            if let Some(task) = self.buckets.get_mut(&order[idx]).and_then(|q| q.pop_front()) {
                self.rr_cursor = (idx + 1) % order.len();
                return Some(task);
            }
        }
        None
    }

    fn pop_shortest_job(&mut self) -> Option<ScheduledTask> {
        let mut best: Option<(TaskPriority, usize, f64)> = None;
        for (priority, queue) in &self.buckets {
            for (idx, task) in queue.iter().enumerate() {
                if let Some(estimate) = task.estimated_duration {
                    let better = match best {
                        Some((_, _, current)) => estimate < current,
                        None => true,
                    };
                    if better {
                        best = Some((*priority, idx, estimate));
                    }
                }
            }
        }
        match best {
            Some((priority, idx, _)) => self.buckets.get_mut(&priority)?.remove(idx),
            // No estimates anywhere: fall back to priority ordering.
            None => self.pop_priority(),
        }
    }

    /// Remove a queued task by id, wherever it sits.
    pub fn remove(&mut self, task_id: &str) -> Option<ScheduledTask> {
        for queue in self.buckets.values_mut() {
            if let Some(idx) = queue.iter().position(|t| t.task_id == task_id) {
                return queue.remove(idx);
            }
        }
        None
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.buckets
            .values()
            .any(|q| q.iter().any(|t| t.task_id == task_id))
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue depth per priority, highest first.
    pub fn sizes(&self) -> Vec<(TaskPriority, usize)> {
        TaskPriority::DESCENDING
            .iter()
            .map(|p| (*p, self.buckets.get(p).map_or(0, VecDeque::len)))
            .collect()
    }
}
