//! End-to-end scenarios over the public facade: admission ordering,
//! dependencies, resource refusal, cancellation, and retry, driven by a
//! gated mock render backend (no sleeps; completion is released through a
//! `Notify` gate).

use std::sync::Arc;

use renderq::channels::NotificationSystem;
use renderq::core::config::EngineConfig;
use renderq::core::error::Result;
use renderq::core::media::{RenderConfig, RenderQuality, Scene};
use renderq::core::quality::{QualityAssessment, RenderSettings};
use renderq::core::task::{TaskPriority, TaskStatus};
use renderq::workflow::{RenderProcessor, WorkflowManager};
use tokio::sync::{Mutex, Notify};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("renderq=debug")
        .with_test_writer()
        .try_init();
}

/// Mock backend. When gated, `compose` blocks until the gate fires, so
/// tests control exactly when each task finishes; either way it records the
/// order in which tasks entered composition.
struct GatedBackend {
    gate: Notify,
    gated: bool,
    compose_ok: bool,
    composed: Mutex<Vec<String>>,
}

impl GatedBackend {
    fn new(gated: bool) -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            gated,
            compose_ok: true,
            composed: Mutex::new(Vec::new()),
        })
    }

    fn refusing() -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            gated: false,
            compose_ok: false,
            composed: Mutex::new(Vec::new()),
        })
    }

    async fn composed(&self) -> Vec<String> {
        self.composed.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl RenderProcessor for GatedBackend {
    async fn compose(
        &self,
        _scenes: &[Scene],
        output_ref: &str,
        _settings: &RenderSettings,
    ) -> Result<bool> {
        // "/results/<task id>.mp4"
        let id = output_ref
            .trim_start_matches("/results/")
            .trim_end_matches(".mp4")
            .to_string();
        self.composed.lock().await.push(id);
        if self.gated {
            self.gate.notified().await;
        }
        Ok(self.compose_ok)
    }

    async fn assess_quality(
        &self,
        _output_ref: &str,
        _settings: &RenderSettings,
    ) -> Result<QualityAssessment> {
        Ok(QualityAssessment::perfect())
    }

    async fn optimize_for_platform(&self, _output_ref: &str, _platform: &str) -> Result<bool> {
        Ok(true)
    }
}

fn engine(config: EngineConfig, backend: Arc<GatedBackend>) -> Arc<WorkflowManager> {
    WorkflowManager::new(config, backend, Arc::new(NotificationSystem::new()))
}

/// Release the gate and spin the runtime until `id` settles in `expected`.
async fn drive_until(
    manager: &Arc<WorkflowManager>,
    backend: &Arc<GatedBackend>,
    id: &str,
    expected: TaskStatus,
) {
    for _ in 0..512 {
        if manager.task_status(id).await.map(|i| i.status) == Some(expected) {
            return;
        }
        backend.gate.notify_waiters();
        tokio::task::yield_now().await;
    }
    panic!(
        "task {id} never reached {expected}, last: {:?}",
        manager.task_status(id).await.map(|i| i.status)
    );
}

#[tokio::test]
async fn priority_order_beats_submission_order() {
    init_tracing();
    let mut config = EngineConfig::default();
    config.scheduler.max_concurrent_tasks = 1;
    let backend = GatedBackend::new(true);
    let manager = engine(config, backend.clone());

    // Submitted low first; admission has not begun yet.
    let low = manager
        .create_task(RenderConfig::example(), TaskPriority::Low, serde_json::Value::Null)
        .await
        .unwrap();
    let high = manager
        .create_task(RenderConfig::example(), TaskPriority::High, serde_json::Value::Null)
        .await
        .unwrap();
    let normal = manager
        .create_task(RenderConfig::example(), TaskPriority::Normal, serde_json::Value::Null)
        .await
        .unwrap();
    manager.start().await;

    drive_until(&manager, &backend, &low, TaskStatus::Completed).await;
    assert_eq!(backend.composed().await, [high.clone(), normal, low]);
    assert_eq!(
        manager.task_status(&high).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn dependent_task_waits_for_its_dependency() {
    init_tracing();
    let backend = GatedBackend::new(true);
    let manager = engine(EngineConfig::default(), backend.clone());
    manager.start().await;

    let b = manager
        .create_task(RenderConfig::example(), TaskPriority::Normal, serde_json::Value::Null)
        .await
        .unwrap();
    let a = manager
        .create_dependent_task(
            RenderConfig::example(),
            TaskPriority::Urgent,
            vec![b.clone()],
            serde_json::Value::Null,
        )
        .await
        .unwrap();

    tokio::task::yield_now().await;
    // A is parked despite its higher priority.
    let stats = manager.statistics().await;
    assert_eq!(stats.queue.waiting, 1);

    drive_until(&manager, &backend, &a, TaskStatus::Completed).await;
    assert_eq!(backend.composed().await, [b, a]);
}

#[tokio::test]
async fn oversized_request_stays_queued() {
    init_tracing();
    let mut config = EngineConfig::default();
    // A 4k render wants 2048MB of accelerator memory; the pool has less.
    config.resources.max_accel_memory_mb = 512;
    let backend = GatedBackend::new(false);
    let manager = engine(config, backend.clone());
    manager.start().await;

    let mut render = RenderConfig::example();
    render.quality = RenderQuality::Uhd4k;
    let id = manager
        .create_task(render, TaskPriority::Urgent, serde_json::Value::Null)
        .await
        .unwrap();

    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
    assert_eq!(manager.task_status(&id).await.unwrap().status, TaskStatus::Pending);
    let stats = manager.statistics().await;
    assert_eq!(stats.queue.total_queued, 1);
    assert_eq!(stats.queue.active, 0);
    assert!(backend.composed().await.is_empty());
}

#[tokio::test]
async fn concurrent_submissions_get_unique_ids() -> anyhow::Result<()> {
    init_tracing();
    let backend = GatedBackend::new(false);
    let manager = engine(EngineConfig::default(), backend);

    let mut handles = Vec::new();
    for _ in 0..64 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .create_task(RenderConfig::example(), TaskPriority::Normal, serde_json::Value::Null)
                .await
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let id = handle.await??;
        assert!(ids.insert(id), "duplicate task id");
    }
    assert_eq!(ids.len(), 64);
    assert_eq!(manager.all_tasks().await.len(), 64);
    Ok(())
}

#[tokio::test]
async fn cancel_running_task_is_terminal_and_idempotent() {
    init_tracing();
    let backend = GatedBackend::new(true);
    let manager = engine(EngineConfig::default(), backend.clone());
    manager.start().await;

    let id = manager
        .create_task(RenderConfig::example(), TaskPriority::Normal, serde_json::Value::Null)
        .await
        .unwrap();
    // Let it reach the gated compose stage.
    for _ in 0..32 {
        tokio::task::yield_now().await;
        if !backend.composed().await.is_empty() {
            break;
        }
    }
    assert_eq!(
        manager.task_status(&id).await.unwrap().status,
        TaskStatus::Generating
    );

    assert!(manager.cancel_task(&id).await);
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
    let info = manager.task_status(&id).await.unwrap();
    assert_eq!(info.status, TaskStatus::Cancelled);
    assert!(!manager.cancel_task(&id).await);

    // The reservation is back; the pool reads idle.
    let stats = manager.statistics().await;
    assert_eq!(stats.queue.active, 0);
    assert_eq!(stats.queue.resources.memory.used_mb, 0);
    assert_eq!(stats.queue.resources.accel_memory.used_mb, 0);
}

#[tokio::test]
async fn failed_task_retries_until_budget_spent() {
    init_tracing();
    let mut config = EngineConfig::default();
    config.scheduler.max_retries = 2;
    let backend = GatedBackend::refusing();
    let manager = engine(config, backend.clone());
    manager.start().await;

    let id = manager
        .create_task(RenderConfig::example(), TaskPriority::Normal, serde_json::Value::Null)
        .await
        .unwrap();
    drive_until(&manager, &backend, &id, TaskStatus::Failed).await;

    assert!(manager.retry_failed_task(&id).await);
    drive_until(&manager, &backend, &id, TaskStatus::Failed).await;
    assert!(manager.retry_failed_task(&id).await);
    drive_until(&manager, &backend, &id, TaskStatus::Failed).await;
    // Two retries allowed, third refused.
    assert!(!manager.retry_failed_task(&id).await);
    assert_eq!(backend.composed().await.len(), 3);
}
