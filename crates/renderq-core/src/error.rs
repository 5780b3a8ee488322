//! Error taxonomy for the orchestration engine.
//!
//! Admission deferral (queue full, unmet dependencies, insufficient
//! resources) is deliberately *not* an error — it is surfaced through task
//! status and queue statistics only.

use thiserror::Error;

/// Engine-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// All error categories the engine can surface to callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid request or out-of-range value, rejected at the API boundary.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced task id is not known to the engine.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The external render processor failed mid-pipeline.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Cooperative cancellation observed during execution.
    #[error("task cancelled: {0}")]
    Cancelled(String),

    /// Notification delivery problem. Isolated per channel, never propagated
    /// into task state.
    #[error("notification error: {0}")]
    Notify(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}
