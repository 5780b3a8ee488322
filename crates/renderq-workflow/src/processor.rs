//! Seams between the orchestration engine and the outside world: the render
//! backend and per-task observers.

use renderq_core::error::Result;
use renderq_core::media::Scene;
use renderq_core::quality::{QualityAssessment, RenderSettings};
use renderq_core::task::TaskInfo;

/// The external render backend. Implementations do the actual media work;
/// the engine never touches codecs itself.
///
/// `compose` and `optimize_for_platform` return `Ok(false)` for a clean
/// "could not produce output" refusal; `Err` is reserved for infrastructure
/// failures. Both end the task as failed.
#[async_trait::async_trait]
pub trait RenderProcessor: Send + Sync {
    /// Produce the output at `output_ref` from the scene list.
    async fn compose(
        &self,
        scenes: &[Scene],
        output_ref: &str,
        settings: &RenderSettings,
    ) -> Result<bool>;

    /// Score a finished output for the quality gate.
    async fn assess_quality(
        &self,
        output_ref: &str,
        settings: &RenderSettings,
    ) -> Result<QualityAssessment>;

    /// One improvement pass over an output that missed the gate.
    async fn optimize_for_platform(&self, output_ref: &str, platform: &str) -> Result<bool>;
}

/// Per-task observer, invoked after every accepted status or progress
/// update with a snapshot of the record.
#[async_trait::async_trait]
pub trait TaskListener: Send + Sync {
    async fn on_update(&self, info: &TaskInfo);
}
