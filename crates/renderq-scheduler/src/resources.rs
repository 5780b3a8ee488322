//! Bounded resource pool — tracks what running tasks have reserved.
//!
//! This component never errors: absence of capacity is a `false` from
//! [`ResourceManager::acquire`], letting the admission loop requeue instead
//! of fail. Mutation is serialized by the scheduler's state lock.

use renderq_core::config::ResourceConfig;
use serde::{Deserialize, Serialize};

/// Declared resource budget a task needs while running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    #[serde(default = "default_memory")]
    pub memory_mb: u64,
    #[serde(default)]
    pub accel_memory_mb: u64,
}

fn default_memory() -> u64 {
    512
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            memory_mb: default_memory(),
            accel_memory_mb: 0,
        }
    }
}

/// Usage snapshot for one dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionUsage {
    pub used_mb: u64,
    pub used_percent: f64,
    pub max_mb: u64,
}

/// Usage snapshot across all tracked dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory: DimensionUsage,
    pub accel_memory: DimensionUsage,
}

/// Tracks a bounded pool of memory and accelerator memory.
///
/// Invariant: `0 <= allocated <= max` in every dimension, at all times.
#[derive(Debug)]
pub struct ResourceManager {
    max_memory_mb: u64,
    max_accel_memory_mb: u64,
    allocated_memory_mb: u64,
    allocated_accel_memory_mb: u64,
}

impl ResourceManager {
    pub fn new(max_memory_mb: u64, max_accel_memory_mb: u64) -> Self {
        Self {
            max_memory_mb,
            max_accel_memory_mb,
            allocated_memory_mb: 0,
            allocated_accel_memory_mb: 0,
        }
    }

    pub fn from_config(config: &ResourceConfig) -> Self {
        Self::new(config.max_memory_mb, config.max_accel_memory_mb)
    }

    /// Reserve the requested budget. All-or-nothing: on `false` nothing was
    /// reserved in any dimension.
    pub fn acquire(&mut self, req: &ResourceRequest) -> bool {
        if self.allocated_memory_mb + req.memory_mb > self.max_memory_mb
            || self.allocated_accel_memory_mb + req.accel_memory_mb > self.max_accel_memory_mb
        {
            return false;
        }
        self.allocated_memory_mb += req.memory_mb;
        self.allocated_accel_memory_mb += req.accel_memory_mb;
        tracing::debug!(
            "📦 Reserved {}MB memory, {}MB accel",
            req.memory_mb,
            req.accel_memory_mb
        );
        true
    }

    /// Return a reservation. Floored at zero, so a stray double-release
    /// cannot drive the counters negative.
    pub fn release(&mut self, req: &ResourceRequest) {
        self.allocated_memory_mb = self.allocated_memory_mb.saturating_sub(req.memory_mb);
        self.allocated_accel_memory_mb = self
            .allocated_accel_memory_mb
            .saturating_sub(req.accel_memory_mb);
        tracing::debug!(
            "📤 Released {}MB memory, {}MB accel",
            req.memory_mb,
            req.accel_memory_mb
        );
    }

    /// Current usage per dimension.
    pub fn usage(&self) -> ResourceUsage {
        ResourceUsage {
            memory: dimension(self.allocated_memory_mb, self.max_memory_mb),
            accel_memory: dimension(self.allocated_accel_memory_mb, self.max_accel_memory_mb),
        }
    }

    /// True when nothing is reserved.
    pub fn idle(&self) -> bool {
        self.allocated_memory_mb == 0 && self.allocated_accel_memory_mb == 0
    }
}

fn dimension(used: u64, max: u64) -> DimensionUsage {
    DimensionUsage {
        used_mb: used,
        used_percent: if max == 0 {
            0.0
        } else {
            (used as f64 / max as f64) * 100.0
        },
        max_mb: max,
    }
}
