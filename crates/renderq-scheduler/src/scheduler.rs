//! The task scheduler — per-priority queues, dependency resolution, a
//! concurrency ceiling, and the admission loop that feeds the registered
//! processor.
//!
//! Scheduler-view state machine per task:
//! `WAITING_ON_DEPS → QUEUED → RUNNING → {COMPLETED | FAILED | CANCELLED}`.
//! Cancellation is cooperative: a running task's token is cancelled and the
//! execution wrapper observes it; resources are released on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use renderq_core::error::{EngineError, Result};
use renderq_core::task::TaskPriority;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::resources::{ResourceManager, ResourceRequest, ResourceUsage};
use crate::strategy::{QueueSet, ScheduledTask, SchedulingStrategy};

/// The unit of work the scheduler admits. The workflow manager registers an
/// implementation that drives its staged pipeline.
#[async_trait::async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Execute one admitted task. Observe `cancel` at suspension points and
    /// return `EngineError::Cancelled` when it fires.
    async fn process(&self, task: &ScheduledTask, cancel: CancellationToken) -> Result<()>;
}

/// Running counters and moving averages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub tasks_scheduled: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub average_wait_secs: f64,
    pub average_execution_secs: f64,
}

impl SchedulerStats {
    fn record_wait(&mut self, wait_secs: f64) {
        let n = self.tasks_completed.max(1) as f64;
        self.average_wait_secs = (self.average_wait_secs * (n - 1.0) + wait_secs) / n;
    }

    fn record_execution(&mut self, exec_secs: f64) {
        let n = self.tasks_completed.max(1) as f64;
        self.average_execution_secs = (self.average_execution_secs * (n - 1.0) + exec_secs) / n;
    }
}

/// Snapshot returned by [`TaskScheduler::queue_status`].
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Queue depth per priority, highest first.
    pub sizes_by_priority: Vec<(TaskPriority, usize)>,
    pub total_queued: usize,
    /// Tasks parked on unmet dependencies.
    pub waiting: usize,
    pub active: usize,
    pub max_concurrent: usize,
    pub strategy: SchedulingStrategy,
    pub resources: ResourceUsage,
    pub stats: SchedulerStats,
}

/// How one execution ended, as seen by the scheduler.
#[derive(Debug)]
enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

struct ActiveTask {
    cancel: CancellationToken,
    resources: ResourceRequest,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct SchedState {
    queues: QueueSet,
    active: HashMap<String, ActiveTask>,
    /// Parked tasks; remaining unmet deps live in `ScheduledTask::dependencies`.
    waiting: HashMap<String, ScheduledTask>,
    /// Reverse index: dependency id → ids parked on it.
    waiters_of: HashMap<String, Vec<String>>,
    scheduled_at: HashMap<String, DateTime<Utc>>,
    stats: SchedulerStats,
    started: bool,
}

/// Priority-queue task scheduler with admission control.
pub struct TaskScheduler {
    max_concurrent: usize,
    strategy: SchedulingStrategy,
    state: Mutex<SchedStateWithResources>,
    processor: OnceLock<Arc<dyn TaskProcessor>>,
}

struct SchedStateWithResources {
    sched: SchedState,
    resources: ResourceManager,
}

impl TaskScheduler {
    pub fn new(
        max_concurrent: usize,
        strategy: SchedulingStrategy,
        resources: ResourceManager,
    ) -> Self {
        tracing::info!(
            "🗓️ TaskScheduler initialized: strategy={strategy}, max_concurrent={max_concurrent}"
        );
        Self {
            max_concurrent,
            strategy,
            state: Mutex::new(SchedStateWithResources {
                sched: SchedState::default(),
                resources,
            }),
            processor: OnceLock::new(),
        }
    }

    /// Register the processor invoked for admitted tasks. May be set once.
    pub fn set_processor(&self, processor: Arc<dyn TaskProcessor>) {
        if self.processor.set(processor).is_err() {
            tracing::warn!("task processor already registered, ignoring replacement");
        }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Begin admitting tasks. Anything scheduled before this call sits in
    /// the queues until now.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.sched.started {
            return;
        }
        state.sched.started = true;
        tracing::info!("▶️ TaskScheduler started");
        self.try_start_next(&mut state);
    }

    /// Stop admitting and cancel everything in flight. Queued and waiting
    /// tasks are dropped.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.sched.started = false;
        for (task_id, active) in &state.sched.active {
            tracing::info!("🛑 Cancelling in-flight task {task_id} on shutdown");
            active.cancel.cancel();
        }
        state.sched.queues = QueueSet::new();
        state.sched.waiting.clear();
        state.sched.waiters_of.clear();
        // Dropped tasks will never start, so their enqueue timestamps go too.
        state.sched.scheduled_at.clear();
        tracing::info!("⏹️ TaskScheduler stopped");
    }

    /// Accept a task. Returns true when accepted, including the
    /// accepted-but-deferred case where unmet dependencies park the task in
    /// the waiter list instead of a queue.
    pub async fn schedule(self: &Arc<Self>, mut task: ScheduledTask) -> bool {
        let mut state = self.state.lock().await;
        let task_id = task.task_id.clone();

        let unmet: Vec<String> = task
            .dependencies
            .iter()
            .filter(|dep| {
                let dep = dep.as_str();
                state.sched.active.contains_key(dep)
                    || state.sched.queues.contains(dep)
                    || state.sched.waiting.contains_key(dep)
            })
            .cloned()
            .collect();

        if !unmet.is_empty() {
            tracing::info!("⏸️ Task {task_id} waiting on dependencies: {unmet:?}");
            task.dependencies = unmet.iter().cloned().collect();
            for dep in &unmet {
                state
                    .sched
                    .waiters_of
                    .entry(dep.clone())
                    .or_default()
                    .push(task_id.clone());
            }
            state.sched.waiting.insert(task_id, task);
            return true;
        }

        task.dependencies.clear();
        self.enqueue(&mut state, task);
        if state.sched.started {
            self.try_start_next(&mut state);
        }
        true
    }

    /// Cancel a task wherever it currently is. Running tasks get a
    /// cooperative cancel (resources released by the completion path);
    /// queued and waiting tasks are removed outright. False if unknown.
    pub async fn cancel(self: &Arc<Self>, task_id: &str) -> bool {
        let mut state = self.state.lock().await;

        if let Some(active) = state.sched.active.get(task_id) {
            tracing::info!("🛑 Cancelling running task {task_id}");
            active.cancel.cancel();
            return true;
        }

        if state.sched.queues.remove(task_id).is_some() {
            tracing::info!("🛑 Cancelled queued task {task_id}");
            state.sched.scheduled_at.remove(task_id);
            state.sched.stats.tasks_cancelled += 1;
            self.settle_dependents(&mut state, task_id);
            if state.sched.started {
                self.try_start_next(&mut state);
            }
            return true;
        }

        if let Some(task) = state.sched.waiting.remove(task_id) {
            tracing::info!("🛑 Cancelled waiting task {task_id}");
            // Drop the reverse-index entries pointing back at this task.
            for dep in &task.dependencies {
                if let Some(waiters) = state.sched.waiters_of.get_mut(dep) {
                    waiters.retain(|id| id != task_id);
                }
            }
            state.sched.stats.tasks_cancelled += 1;
            self.settle_dependents(&mut state, task_id);
            return true;
        }

        false
    }

    /// Current queue depths, activity, resource usage, and stats.
    pub async fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            sizes_by_priority: state.sched.queues.sizes(),
            total_queued: state.sched.queues.len(),
            waiting: state.sched.waiting.len(),
            active: state.sched.active.len(),
            max_concurrent: self.max_concurrent,
            strategy: self.strategy,
            resources: state.resources.usage(),
            stats: state.sched.stats.clone(),
        }
    }

    /// Number of currently running tasks.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.sched.active.len()
    }

    fn enqueue(&self, state: &mut SchedStateWithResources, task: ScheduledTask) {
        tracing::info!(
            "📥 Queued task {} (priority={})",
            task.task_id,
            task.priority
        );
        state
            .sched
            .scheduled_at
            .insert(task.task_id.clone(), Utc::now());
        state.sched.stats.tasks_scheduled += 1;
        state.sched.queues.push(task);
    }

    /// The admission loop. Runs while slots, selectable tasks, and resources
    /// allow; a resource refusal returns the selected task to the head of
    /// its queue and stops the pass (head-of-line blocking, intentional —
    /// the pass re-fires on the next completion event).
    fn try_start_next(self: &Arc<Self>, state: &mut SchedStateWithResources) {
        loop {
            if state.sched.active.len() >= self.max_concurrent {
                return;
            }
            let Some(task) = state.sched.queues.pop_next(self.strategy) else {
                return;
            };
            if !state.resources.acquire(&task.resources) {
                tracing::debug!("⏳ Insufficient resources for task {}", task.task_id);
                state.sched.queues.push_front(task);
                return;
            }
            self.spawn_execution(state, task);
        }
    }

    fn spawn_execution(self: &Arc<Self>, state: &mut SchedStateWithResources, task: ScheduledTask) {
        let task_id = task.task_id.clone();
        let cancel = CancellationToken::new();
        state.sched.active.insert(
            task_id.clone(),
            ActiveTask {
                cancel: cancel.clone(),
                resources: task.resources.clone(),
                started_at: Utc::now(),
            },
        );
        tracing::info!("🚀 Started task {task_id}");

        let scheduler = Arc::clone(self);
        let processor = self.processor.get().cloned();
        tokio::spawn(async move {
            let outcome = match processor {
                Some(processor) => {
                    tokio::select! {
                        _ = cancel.cancelled() => Outcome::Cancelled,
                        result = processor.process(&task, cancel.clone()) => match result {
                            Ok(()) => Outcome::Completed,
                            Err(EngineError::Cancelled(_)) => Outcome::Cancelled,
                            Err(e) => Outcome::Failed(e.to_string()),
                        },
                    }
                }
                None => {
                    tracing::warn!("no task processor registered, completing {} as a no-op", task.task_id);
                    Outcome::Completed
                }
            };
            scheduler.finish(&task.task_id, outcome).await;
        });
    }

    /// Completion path for every execution, success or not: release the
    /// reservation, update stats, wake dependents, re-run admission.
    async fn finish(self: &Arc<Self>, task_id: &str, outcome: Outcome) {
        let mut state = self.state.lock().await;
        let Some(active) = state.sched.active.remove(task_id) else {
            return;
        };
        state.resources.release(&active.resources);

        let now = Utc::now();
        match outcome {
            Outcome::Completed => {
                state.sched.stats.tasks_completed += 1;
                let exec = (now - active.started_at).num_milliseconds() as f64 / 1000.0;
                state.sched.stats.record_execution(exec);
                if let Some(scheduled) = state.sched.scheduled_at.remove(task_id) {
                    let wait = (active.started_at - scheduled).num_milliseconds() as f64 / 1000.0;
                    state.sched.stats.record_wait(wait);
                }
                tracing::info!("✅ Task {task_id} completed");
            }
            Outcome::Failed(reason) => {
                state.sched.stats.tasks_failed += 1;
                state.sched.scheduled_at.remove(task_id);
                tracing::warn!("❌ Task {task_id} failed: {reason}");
            }
            Outcome::Cancelled => {
                state.sched.stats.tasks_cancelled += 1;
                state.sched.scheduled_at.remove(task_id);
                tracing::info!("🛑 Task {task_id} cancelled");
            }
        }

        self.settle_dependents(&mut state, task_id);
        if state.sched.started {
            self.try_start_next(&mut state);
        }
    }

    /// A task reached a terminal state: prune it from every waiter's
    /// dependency set and promote waiters whose set became empty.
    fn settle_dependents(&self, state: &mut SchedStateWithResources, finished_id: &str) {
        let Some(waiter_ids) = state.sched.waiters_of.remove(finished_id) else {
            return;
        };
        for waiter_id in waiter_ids {
            let ready = match state.sched.waiting.get_mut(&waiter_id) {
                Some(waiter) => {
                    waiter.dependencies.remove(finished_id);
                    waiter.dependencies.is_empty()
                }
                None => false,
            };
            if ready {
                if let Some(task) = state.sched.waiting.remove(&waiter_id) {
                    tracing::info!("🔓 Dependencies satisfied for task {waiter_id}");
                    self.enqueue(state, task);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Processor whose completions are gated by a Notify, so tests control
    /// exactly when each execution finishes.
    struct GatedProcessor {
        gate: Arc<Notify>,
        order: Mutex<Vec<String>>,
        peak_active: AtomicUsize,
        active: AtomicUsize,
    }

    impl GatedProcessor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Arc::new(Notify::new()),
                order: Mutex::new(Vec::new()),
                peak_active: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
            })
        }

        async fn started(&self) -> Vec<String> {
            self.order.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl TaskProcessor for GatedProcessor {
        async fn process(&self, task: &ScheduledTask, cancel: CancellationToken) -> Result<()> {
            self.order.lock().await.push(task.task_id.clone());
            let n = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_active.fetch_max(n, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    Err(EngineError::Cancelled(task.task_id.clone()))
                }
                _ = self.gate.notified() => {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }
    }

    fn scheduler(max_concurrent: usize, strategy: SchedulingStrategy) -> Arc<TaskScheduler> {
        Arc::new(TaskScheduler::new(
            max_concurrent,
            strategy,
            ResourceManager::new(4096, 8192),
        ))
    }

    async fn drain(sched: &Arc<TaskScheduler>, processor: &Arc<GatedProcessor>) {
        // Let every in-flight execution complete, yielding so completion
        // paths run.
        for _ in 0..64 {
            processor.gate.notify_waiters();
            tokio::task::yield_now().await;
        }
        let _ = sched;
    }

    fn task(id: &str, priority: TaskPriority) -> ScheduledTask {
        ScheduledTask::new(id, priority)
    }

    #[tokio::test]
    async fn test_priority_admission_order() {
        let sched = scheduler(1, SchedulingStrategy::Priority);
        let processor = GatedProcessor::new();
        sched.set_processor(processor.clone());

        // Submit before start so admission sees all three at once.
        assert!(sched.schedule(task("low", TaskPriority::Low)).await);
        assert!(sched.schedule(task("high", TaskPriority::High)).await);
        assert!(sched.schedule(task("normal", TaskPriority::Normal)).await);
        sched.start().await;

        drain(&sched, &processor).await;
        assert_eq!(processor.started().await, ["high", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let sched = scheduler(2, SchedulingStrategy::Priority);
        let processor = GatedProcessor::new();
        sched.set_processor(processor.clone());
        sched.start().await;

        for i in 0..5 {
            sched.schedule(task(&format!("t{i}"), TaskPriority::Normal)).await;
        }
        tokio::task::yield_now().await;
        assert_eq!(sched.active_count().await, 2);

        drain(&sched, &processor).await;
        assert_eq!(processor.peak_active.load(Ordering::SeqCst), 2);
        assert_eq!(sched.queue_status().await.stats.tasks_completed, 5);
    }

    #[tokio::test]
    async fn test_resource_refusal_blocks_head_of_line() {
        let sched = Arc::new(TaskScheduler::new(
            4,
            SchedulingStrategy::Priority,
            ResourceManager::new(1024, 0),
        ));
        let processor = GatedProcessor::new();
        sched.set_processor(processor.clone());
        sched.start().await;

        let mut big = task("big", TaskPriority::High);
        big.resources = ResourceRequest { memory_mb: 900, accel_memory_mb: 0 };
        let mut big2 = task("big2", TaskPriority::High);
        big2.resources = ResourceRequest { memory_mb: 900, accel_memory_mb: 0 };

        sched.schedule(big).await;
        sched.schedule(big2).await;
        tokio::task::yield_now().await;

        // Only one fits; the second stays queued at the head.
        assert_eq!(sched.active_count().await, 1);
        assert_eq!(sched.queue_status().await.total_queued, 1);

        drain(&sched, &processor).await;
        let status = sched.queue_status().await;
        assert_eq!(status.stats.tasks_completed, 2);
        assert_eq!(status.resources.memory.used_mb, 0);
    }

    #[tokio::test]
    async fn test_dependency_deferral_and_promotion() {
        let sched = scheduler(2, SchedulingStrategy::Priority);
        let processor = GatedProcessor::new();
        sched.set_processor(processor.clone());
        sched.start().await;

        sched.schedule(task("b", TaskPriority::Normal)).await;
        let mut a = task("a", TaskPriority::Normal);
        a.dependencies.insert("b".into());
        assert!(sched.schedule(a).await);
        tokio::task::yield_now().await;

        // A is parked, not queued.
        let status = sched.queue_status().await;
        assert_eq!(status.waiting, 1);
        assert_eq!(status.active, 1);

        drain(&sched, &processor).await;
        assert_eq!(processor.started().await, ["b", "a"]);
        assert_eq!(sched.queue_status().await.waiting, 0);
    }

    #[tokio::test]
    async fn test_cancel_running_releases_resources() {
        let sched = scheduler(1, SchedulingStrategy::Priority);
        let processor = GatedProcessor::new();
        sched.set_processor(processor.clone());
        sched.start().await;

        let mut t = task("t", TaskPriority::Normal);
        t.resources = ResourceRequest { memory_mb: 1024, accel_memory_mb: 0 };
        sched.schedule(t).await;
        tokio::task::yield_now().await;
        assert_eq!(sched.active_count().await, 1);

        assert!(sched.cancel("t").await);
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        let status = sched.queue_status().await;
        assert_eq!(status.active, 0);
        assert_eq!(status.resources.memory.used_mb, 0);
        assert_eq!(status.stats.tasks_cancelled, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drops_queued_bookkeeping() {
        let sched = scheduler(1, SchedulingStrategy::Priority);
        let processor = GatedProcessor::new();
        sched.set_processor(processor.clone());

        sched.schedule(task("q1", TaskPriority::Normal)).await;
        sched.schedule(task("q2", TaskPriority::Low)).await;
        let mut waiter = task("w", TaskPriority::Normal);
        waiter.dependencies.insert("q1".into());
        sched.schedule(waiter).await;

        sched.shutdown().await;
        let state = sched.state.lock().await;
        assert_eq!(state.sched.queues.len(), 0);
        assert!(state.sched.waiting.is_empty());
        assert!(state.sched.waiters_of.is_empty());
        // No enqueue timestamps may outlive the tasks they belong to.
        assert!(state.sched.scheduled_at.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_returns_false() {
        let sched = scheduler(1, SchedulingStrategy::Priority);
        assert!(!sched.cancel("task_missing0000").await);
    }

    #[tokio::test]
    async fn test_cancel_queued_before_start() {
        let sched = scheduler(1, SchedulingStrategy::Priority);
        let processor = GatedProcessor::new();
        sched.set_processor(processor.clone());

        sched.schedule(task("t", TaskPriority::Normal)).await;
        assert!(sched.cancel("t").await);
        sched.start().await;
        drain(&sched, &processor).await;
        assert!(processor.started().await.is_empty());
    }
}
