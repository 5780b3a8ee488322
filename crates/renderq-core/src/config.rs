//! Engine configuration, TOML-backed.
//!
//! Every field has a serde default so a partial file (or none at all) yields
//! a working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::quality::DEFAULT_QUALITY_THRESHOLD;

/// Root configuration for the orchestration engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl EngineConfig {
    /// Load from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("failed to parse config: {e}")))
    }
}

/// Scheduler behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrency ceiling for running tasks.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,
    /// Admission strategy: "fifo", "priority", "round_robin",
    /// "shortest_job_first".
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Per-task retry ceiling for explicit retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_concurrent() -> usize {
    5
}
fn default_strategy() -> String {
    "priority".into()
}
fn default_max_retries() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            strategy: default_strategy(),
            max_retries: default_max_retries(),
        }
    }
}

/// Resource pool ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: u64,
    #[serde(default = "default_max_accel_memory")]
    pub max_accel_memory_mb: u64,
}

fn default_max_memory() -> u64 {
    4096
}
fn default_max_accel_memory() -> u64 {
    8192
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory(),
            max_accel_memory_mb: default_max_accel_memory(),
        }
    }
}

/// Quality gate settings for the rendering stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// When enabled, outputs scoring below the threshold get one
    /// optimization pass before completion.
    #[serde(default = "bool_true")]
    pub gate_enabled: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn bool_true() -> bool {
    true
}
fn default_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            gate_enabled: bool_true(),
            threshold: default_threshold(),
        }
    }
}

/// Notification channel configuration. A channel with no config stays
/// unregistered.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// SMTP settings for the email channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Outbound webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}
