//! Quality assessment results and the render settings handed to the
//! external processor.

use serde::{Deserialize, Serialize};

use crate::media::{AspectRatio, RenderConfig, RenderQuality};

/// Settings passed to the external render processor. A minimal projection of
/// [`RenderConfig`] — the processor does not see scheduling concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    pub quality: RenderQuality,
    pub aspect_ratio: AspectRatio,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub audio_enabled: bool,
}

fn default_fps() -> u32 {
    30
}

impl RenderSettings {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            quality: config.quality,
            aspect_ratio: config.aspect_ratio,
            fps: default_fps(),
            audio_enabled: config.audio.as_ref().map_or(false, |a| a.enabled),
        }
    }
}

/// Default acceptance threshold for the quality gate.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.8;

/// Scored evaluation of a finished output, produced by the external
/// processor's `assess_quality`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Aggregate score in `[0, 1]`.
    pub overall_score: f64,
    pub resolution_score: f64,
    pub bitrate_score: f64,
    pub frame_rate_score: f64,
    pub audio_quality_score: f64,
    pub sync_accuracy_score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl QualityAssessment {
    /// Quality gate: acceptable iff the overall score meets the threshold.
    pub fn is_acceptable(&self, threshold: f64) -> bool {
        self.overall_score >= threshold
    }

    /// An assessment that passes any sane gate. Useful for processors that
    /// do not implement scoring.
    pub fn perfect() -> Self {
        Self {
            overall_score: 1.0,
            resolution_score: 1.0,
            bitrate_score: 1.0,
            frame_rate_score: 1.0,
            audio_quality_score: 1.0,
            sync_accuracy_score: 1.0,
            issues: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}
