//! Worker-facing protocol types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one execution context, assigned by the host.
pub type WorkerId = u64;

/// Commands sent from the engine to the automation driver inside a
/// worker's execution context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverCommand {
    /// Run the composed prompt for this item.
    RunPrompt { index: usize, payload: String },

    /// The artifact for this item is already in flight; stop retriggering
    /// the produce action.
    DownloadStarted { index: usize },

    /// The context was just focused; the driver may retry its current
    /// step.
    ForegroundTick,
}

/// Errors reported by a worker host.
#[derive(Debug, Error)]
pub enum WorkerHostError {
    #[error("Failed to open execution context: {0}")]
    OpenFailed(String),

    #[error("Driver injection failed in worker {worker}: {message}")]
    InjectionFailed { worker: WorkerId, message: String },

    #[error("Worker {0} not found")]
    NotFound(WorkerId),

    #[error("Host unavailable: {0}")]
    Unavailable(String),
}
