//! The workflow manager — canonical task records, lifecycle control, and
//! the staged pipeline the scheduler admits tasks into.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use renderq_channels::{Channel, EmailHandler, NotificationSystem, WebhookHandler};
use renderq_core::config::EngineConfig;
use renderq_core::error::{EngineError, Result};
use renderq_core::media::RenderConfig;
use renderq_core::quality::RenderSettings;
use renderq_core::task::{TaskContext, TaskInfo, TaskPriority, TaskStatus};
use renderq_core::task_id;
use renderq_scheduler::resources::{ResourceManager, ResourceRequest};
use renderq_scheduler::scheduler::{QueueStatus, TaskProcessor, TaskScheduler};
use renderq_scheduler::strategy::{ScheduledTask, SchedulingStrategy};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::processor::{RenderProcessor, TaskListener};

/// Base execution estimate in seconds for a 10-second HD render.
const BASE_ESTIMATE_SECS: f64 = 30.0;
/// Main memory every render reserves while running.
const TASK_MEMORY_MB: u64 = 1024;

/// Progress checkpoints at the pipeline stage boundaries.
const PROGRESS_PREPARED: f64 = 0.2;
const PROGRESS_COMPOSED: f64 = 0.5;
const PROGRESS_RENDERED: f64 = 0.8;

/// Aggregate counters plus the live scheduler view.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatistics {
    pub total_created: usize,
    pub active: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub queue: QueueStatus,
}

struct WorkflowState {
    tasks: HashMap<String, TaskContext>,
    listeners: HashMap<String, Vec<Arc<dyn TaskListener>>>,
}

/// Owns every task record and drives it from `Pending` to a terminal state.
/// All status mutations funnel through [`update_status`](Self::update_status),
/// which enforces the transition table.
pub struct WorkflowManager {
    config: EngineConfig,
    processor: Arc<dyn RenderProcessor>,
    notifications: Arc<NotificationSystem>,
    scheduler: Arc<TaskScheduler>,
    state: RwLock<WorkflowState>,
}

impl WorkflowManager {
    pub fn new(
        config: EngineConfig,
        processor: Arc<dyn RenderProcessor>,
        notifications: Arc<NotificationSystem>,
    ) -> Arc<Self> {
        let strategy = SchedulingStrategy::from_str(&config.scheduler.strategy).unwrap_or_else(|e| {
            tracing::warn!("⚠️ {e}, falling back to priority");
            SchedulingStrategy::Priority
        });
        let scheduler = Arc::new(TaskScheduler::new(
            config.scheduler.max_concurrent_tasks,
            strategy,
            ResourceManager::from_config(&config.resources),
        ));

        let manager = Arc::new(Self {
            config,
            processor,
            notifications,
            scheduler,
            state: RwLock::new(WorkflowState {
                tasks: HashMap::new(),
                listeners: HashMap::new(),
            }),
        });
        manager.scheduler.set_processor(Arc::new(PipelineProcessor {
            manager: Arc::downgrade(&manager),
        }));
        tracing::info!("🎬 WorkflowManager initialized");
        manager
    }

    /// Register configured notification channels and begin admitting tasks.
    /// Tasks created before this call stay queued.
    pub async fn start(&self) {
        if let Some(email) = &self.config.notify.email {
            self.notifications
                .add_handler(Channel::Email, Arc::new(EmailHandler::new(email.clone())))
                .await;
        }
        if let Some(webhook) = &self.config.notify.webhook {
            self.notifications
                .add_handler(Channel::Webhook, Arc::new(WebhookHandler::new(webhook.clone())))
                .await;
        }
        self.scheduler.start().await;
        tracing::info!("▶️ WorkflowManager started");
    }

    /// Stop admitting and cancel in-flight work. Task records are kept.
    pub async fn stop(&self) {
        self.scheduler.shutdown().await;
        tracing::info!("⏹️ WorkflowManager stopped");
    }

    /// Validate, record, and schedule a new generation task. Returns the
    /// assigned task id.
    pub async fn create_task(
        &self,
        config: RenderConfig,
        priority: TaskPriority,
        metadata: serde_json::Value,
    ) -> Result<String> {
        self.create_dependent_task(config, priority, Vec::new(), metadata)
            .await
    }

    /// Like [`create_task`](Self::create_task), deferred until every listed
    /// task reaches a terminal state.
    pub async fn create_dependent_task(
        &self,
        config: RenderConfig,
        priority: TaskPriority,
        dependencies: Vec<String>,
        metadata: serde_json::Value,
    ) -> Result<String> {
        config.check().map_err(EngineError::Validation)?;

        let id = task_id::generate();
        let info = TaskInfo::new(id.clone(), config);
        let mut ctx = TaskContext::new(info, priority, self.config.scheduler.max_retries);
        ctx.dependencies = dependencies.iter().cloned().collect();
        ctx.metadata = metadata;

        let scheduled = self.to_scheduled(&ctx);
        let snapshot = ctx.info.clone();
        self.state.write().await.tasks.insert(id.clone(), ctx);

        tracing::info!("📝 Created task {id} (priority={priority})");
        self.notifications.notify_task_created(&snapshot).await;
        self.scheduler.schedule(scheduled).await;
        Ok(id)
    }

    /// Snapshot of one task record.
    pub async fn task_status(&self, task_id: &str) -> Option<TaskInfo> {
        self.state
            .read()
            .await
            .tasks
            .get(task_id)
            .map(|ctx| ctx.info.clone())
    }

    /// Snapshot of every task record.
    pub async fn all_tasks(&self) -> Vec<TaskInfo> {
        self.state
            .read()
            .await
            .tasks
            .values()
            .map(|ctx| ctx.info.clone())
            .collect()
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskInfo> {
        self.state
            .read()
            .await
            .tasks
            .values()
            .filter(|ctx| ctx.info.status == status)
            .map(|ctx| ctx.info.clone())
            .collect()
    }

    /// Cancel a task wherever it is. False for unknown ids and tasks that
    /// already reached a terminal state, so a second cancel is a no-op.
    pub async fn cancel_task(&self, task_id: &str) -> bool {
        let current = self
            .state
            .read()
            .await
            .tasks
            .get(task_id)
            .map(|ctx| ctx.info.status);
        match current {
            None => return false,
            Some(status) if status.is_terminal() => return false,
            Some(_) => {}
        }

        self.scheduler.cancel(task_id).await;
        // The record flips here rather than in the pipeline; the execution
        // future may already have been dropped by the cancellation race.
        self.update_status(task_id, TaskStatus::Cancelled).await.is_ok()
    }

    /// Re-schedule a failed task. Bounded by `max_retries`; false when the
    /// task is unknown, not failed, or out of retries.
    pub async fn retry_failed_task(&self, task_id: &str) -> bool {
        let scheduled = {
            let mut state = self.state.write().await;
            let Some(ctx) = state.tasks.get_mut(task_id) else {
                return false;
            };
            if !ctx.can_retry() {
                return false;
            }
            ctx.retry_count += 1;
            if !ctx.info.reset_for_retry() {
                return false;
            }
            tracing::info!(
                "🔁 Retrying task {task_id} (attempt {}/{})",
                ctx.retry_count,
                ctx.max_retries
            );
            self.to_scheduled(ctx)
        };
        self.scheduler.schedule(scheduled).await;
        true
    }

    /// Apply an externally reported progress update, with an optional status
    /// transition. Out-of-range progress is a `Validation` error; a report
    /// lower than the current progress is ignored (`Ok(false)`), never an
    /// error, so reporters cannot roll progress backwards.
    pub async fn update_progress(
        &self,
        task_id: &str,
        progress: f64,
        status: Option<TaskStatus>,
    ) -> Result<bool> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(EngineError::Validation(format!(
                "progress {progress} outside [0, 1]"
            )));
        }
        if let Some(to) = status {
            self.update_status(task_id, to).await?;
        }
        self.set_progress(task_id, progress).await
    }

    /// Observe every subsequent update of one task.
    pub async fn add_task_listener(&self, task_id: &str, listener: Arc<dyn TaskListener>) {
        self.state
            .write()
            .await
            .listeners
            .entry(task_id.to_string())
            .or_default()
            .push(listener);
    }

    pub async fn statistics(&self) -> WorkflowStatistics {
        let queue = self.scheduler.queue_status().await;
        let state = self.state.read().await;
        let mut stats = WorkflowStatistics {
            total_created: state.tasks.len(),
            active: 0,
            pending: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            queue,
        };
        for ctx in state.tasks.values() {
            match ctx.info.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
                _ => stats.active += 1,
            }
        }
        stats
    }

    pub fn notifications(&self) -> &Arc<NotificationSystem> {
        &self.notifications
    }

    /// The single status-transition chokepoint. Rejects anything the
    /// transition table forbids, then fans the accepted snapshot out to
    /// notifications and listeners.
    async fn update_status(&self, task_id: &str, to: TaskStatus) -> Result<TaskInfo> {
        let snapshot = {
            let mut state = self.state.write().await;
            let ctx = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;
            let from = ctx.info.status;
            if !from.can_transition(to) {
                return Err(EngineError::Validation(format!(
                    "illegal transition {from} -> {to} for task {task_id}"
                )));
            }
            ctx.info.status = to;
            ctx.info.updated_at = chrono::Utc::now();
            if to == TaskStatus::Completed {
                ctx.info.progress = 1.0;
            }
            tracing::info!("🔀 Task {task_id}: {from} -> {to}");
            ctx.info.clone()
        };

        match to {
            TaskStatus::Processing => self.notifications.notify_task_started(&snapshot).await,
            TaskStatus::Completed => self.notifications.notify_task_completed(&snapshot).await,
            TaskStatus::Failed => self.notifications.notify_task_failed(&snapshot).await,
            TaskStatus::Cancelled => self.notifications.notify_task_cancelled(&snapshot).await,
            _ => {}
        }
        self.fan_out(&snapshot).await;
        Ok(snapshot)
    }

    /// Raise progress to `progress` if that is an increase; lower reports
    /// are ignored. `Ok(true)` when the record changed. Terminal records
    /// never move: a pipeline poll racing a concurrent cancel must not land
    /// a progress bump on a record already flipped to `Cancelled`.
    async fn set_progress(&self, task_id: &str, progress: f64) -> Result<bool> {
        let snapshot = {
            let mut state = self.state.write().await;
            let ctx = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;
            if ctx.info.status.is_terminal() {
                return Ok(false);
            }
            if progress <= ctx.info.progress {
                return Ok(false);
            }
            ctx.info.progress = progress;
            ctx.info.updated_at = chrono::Utc::now();
            ctx.info.clone()
        };
        self.notifications.notify_task_progress(&snapshot).await;
        self.fan_out(&snapshot).await;
        Ok(true)
    }

    async fn fan_out(&self, info: &TaskInfo) {
        let listeners: Vec<Arc<dyn TaskListener>> = self
            .state
            .read()
            .await
            .listeners
            .get(&info.id)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener.on_update(info).await;
        }
    }

    fn to_scheduled(&self, ctx: &TaskContext) -> ScheduledTask {
        let config = &ctx.info.config;
        ScheduledTask {
            task_id: ctx.info.id.clone(),
            priority: ctx.priority,
            created_at: ctx.info.created_at,
            estimated_duration: Some(estimate_duration(config)),
            dependencies: ctx.dependencies.clone(),
            resources: ResourceRequest {
                memory_mb: TASK_MEMORY_MB,
                accel_memory_mb: config.quality.accel_memory_mb(),
            },
        }
    }

    // ---- pipeline ----

    /// One admitted execution, driven stage by stage. The cancellation token
    /// is observed at every stage boundary; processor refusals and errors
    /// fail the task with a recorded reason.
    async fn run_pipeline(&self, task_id: &str, cancel: CancellationToken) -> Result<()> {
        let (config, metadata) = {
            let state = self.state.read().await;
            let ctx = state
                .tasks
                .get(task_id)
                .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;
            (ctx.info.config.clone(), ctx.metadata.clone())
        };
        let settings = RenderSettings::from_config(&config);
        let output_ref = format!("/results/{task_id}.mp4");

        // Stage 1: preparation.
        self.advance(task_id, TaskStatus::Processing, &cancel).await?;
        self.set_progress(task_id, PROGRESS_PREPARED).await?;

        // Stage 2: composition.
        self.advance(task_id, TaskStatus::Generating, &cancel).await?;
        match self.processor.compose(&config.scenes, &output_ref, &settings).await {
            Ok(true) => {}
            Ok(false) => return self.fail(task_id, "composition produced no output").await,
            Err(e) => return self.fail(task_id, &format!("composition failed: {e}")).await,
        }
        self.set_progress(task_id, PROGRESS_COMPOSED).await?;

        // Stage 3: rendering and the quality gate.
        self.advance(task_id, TaskStatus::Rendering, &cancel).await?;
        if self.config.quality.gate_enabled {
            let assessment = match self.processor.assess_quality(&output_ref, &settings).await {
                Ok(a) => a,
                Err(e) => return self.fail(task_id, &format!("quality assessment failed: {e}")).await,
            };
            if !assessment.is_acceptable(self.config.quality.threshold) {
                tracing::info!(
                    "🔧 Task {task_id} scored {:.2}, running optimization pass",
                    assessment.overall_score
                );
                let platform = metadata["platform"].as_str().unwrap_or("web").to_string();
                match self.processor.optimize_for_platform(&output_ref, &platform).await {
                    Ok(true) => {}
                    Ok(false) => return self.fail(task_id, "optimization pass refused").await,
                    Err(e) => return self.fail(task_id, &format!("optimization failed: {e}")).await,
                }
            }
        }
        self.set_progress(task_id, PROGRESS_RENDERED).await?;

        // Stage 4: finalization.
        self.check_cancelled(task_id, &cancel).await?;
        {
            let mut state = self.state.write().await;
            if let Some(ctx) = state.tasks.get_mut(task_id) {
                ctx.info.result_ref = Some(output_ref);
            }
        }
        self.update_status(task_id, TaskStatus::Completed).await?;
        Ok(())
    }

    /// Stage boundary: bail out on cancellation, then transition. A record
    /// already flipped to `Cancelled` by [`cancel_task`](Self::cancel_task)
    /// surfaces here as a rejected transition and is reported as cancelled.
    async fn advance(
        &self,
        task_id: &str,
        to: TaskStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.check_cancelled(task_id, cancel).await?;
        match self.update_status(task_id, to).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if self.task_status(task_id).await.map(|i| i.status)
                    == Some(TaskStatus::Cancelled)
                {
                    Err(EngineError::Cancelled(task_id.to_string()))
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn check_cancelled(&self, task_id: &str, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            // Best effort; cancel_task usually got here first.
            let _ = self.update_status(task_id, TaskStatus::Cancelled).await;
            return Err(EngineError::Cancelled(task_id.to_string()));
        }
        Ok(())
    }

    /// Record a failure reason and flip the task to `Failed`.
    async fn fail(&self, task_id: &str, reason: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if let Some(ctx) = state.tasks.get_mut(task_id) {
                ctx.info.error_message = Some(reason.to_string());
            }
        }
        let _ = self.update_status(task_id, TaskStatus::Failed).await;
        Err(EngineError::Execution(reason.to_string()))
    }
}

/// Expected execution time in seconds: base cost scaled by requested length,
/// quality tier, and scene count.
pub fn estimate_duration(config: &RenderConfig) -> f64 {
    let length_factor = f64::from(config.duration_secs) / 10.0;
    let scene_factor = if config.scenes.is_empty() {
        1.0
    } else {
        0.5 * config.scenes.len() as f64
    };
    BASE_ESTIMATE_SECS * length_factor * config.quality.duration_multiplier() * scene_factor
}

/// Adapter handed to the scheduler. Holds a weak back-reference so the
/// scheduler's registered processor does not keep the manager alive.
struct PipelineProcessor {
    manager: Weak<WorkflowManager>,
}

#[async_trait::async_trait]
impl TaskProcessor for PipelineProcessor {
    async fn process(&self, task: &ScheduledTask, cancel: CancellationToken) -> Result<()> {
        let Some(manager) = self.manager.upgrade() else {
            return Err(EngineError::Execution("workflow manager dropped".into()));
        };
        manager.run_pipeline(&task.task_id, cancel).await
    }
}
