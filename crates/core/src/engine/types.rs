//! Core work-item data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Item Status
// ============================================================================

/// Lifecycle status of a single work item.
///
/// Items only move forward along
/// `queued → assigned → submitted → waiting → downloading → done`,
/// with `error` reachable from any non-terminal state. `done` and `error`
/// are absorbing: once entered, later events for the item are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting for a free worker slot.
    Queued,

    /// A worker slot was claimed; the execution context is being opened
    /// and the automation driver injected.
    Assigned,

    /// The driver received the prompt payload.
    Submitted,

    /// The driver confirmed the request was sent; the item now waits for
    /// the remote render to finish.
    Waiting,

    /// An artifact was bound to this item and is in flight.
    Downloading,

    /// The artifact reached disk under its final name.
    Done,

    /// The item failed; the message says why.
    Error { message: String },
}

impl ItemStatus {
    /// Returns the status as a snake_case string for logs and API responses.
    pub fn state_type(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Assigned => "assigned",
            ItemStatus::Submitted => "submitted",
            ItemStatus::Waiting => "waiting",
            ItemStatus::Downloading => "downloading",
            ItemStatus::Done => "done",
            ItemStatus::Error { .. } => "error",
        }
    }

    /// True for `done` and `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error { .. })
    }

    /// True while the item occupies a worker slot
    /// (`assigned`, `submitted` or `waiting`).
    pub fn occupies_slot(&self) -> bool {
        matches!(
            self,
            ItemStatus::Assigned | ItemStatus::Submitted | ItemStatus::Waiting
        )
    }
}

// ============================================================================
// Work Item
// ============================================================================

/// One unit of the pipeline: a prompt to render and download.
///
/// `index` is 0-based, assigned by input order, and immutable for the run.
/// Status is only mutated through the engine's guarded transition
/// functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub index: usize,
    pub payload: String,
    pub status: ItemStatus,
}

impl WorkItem {
    pub fn new(index: usize, payload: impl Into<String>) -> Self {
        Self {
            index,
            payload: payload.into(),
            status: ItemStatus::Queued,
        }
    }

    /// `queued → assigned`. Returns whether the transition applied.
    pub fn mark_assigned(&mut self) -> bool {
        if self.status == ItemStatus::Queued {
            self.status = ItemStatus::Assigned;
            true
        } else {
            false
        }
    }

    /// `assigned → submitted`.
    pub fn mark_submitted(&mut self) -> bool {
        if self.status == ItemStatus::Assigned {
            self.status = ItemStatus::Submitted;
            true
        } else {
            false
        }
    }

    /// `assigned|submitted → waiting`.
    pub fn mark_waiting(&mut self) -> bool {
        if matches!(self.status, ItemStatus::Assigned | ItemStatus::Submitted) {
            self.status = ItemStatus::Waiting;
            true
        } else {
            false
        }
    }

    /// Any slot-occupying state `→ downloading`.
    pub fn mark_downloading(&mut self) -> bool {
        if self.status.occupies_slot() {
            self.status = ItemStatus::Downloading;
            true
        } else {
            false
        }
    }

    /// Any non-terminal state `→ done`. Re-applying on a terminal item is
    /// a no-op.
    pub fn mark_done(&mut self) -> bool {
        if self.status.is_terminal() {
            false
        } else {
            self.status = ItemStatus::Done;
            true
        }
    }

    /// Any non-terminal state `→ error`. Re-applying on a terminal item is
    /// a no-op.
    pub fn mark_error(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            false
        } else {
            self.status = ItemStatus::Error {
                message: message.into(),
            };
            true
        }
    }
}

// ============================================================================
// Concurrency Mode
// ============================================================================

/// How many items may be in flight at once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// No cap: every item is admitted immediately.
    All,
    /// At most `cap` items in `{assigned, submitted, waiting}`.
    Capped,
}

// ============================================================================
// Activity Log
// ============================================================================

/// One line of the bounded recent-activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Run Snapshot
// ============================================================================

/// Read-only projection of the run for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub running: bool,
    pub paused: bool,
    pub done: usize,
    pub total: usize,
    /// The tail of the activity log in chronological order, at most the
    /// configured snapshot window.
    pub recent: Vec<LogEntry>,
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            paused: false,
            done: 0,
            total: 0,
            recent: Vec::new(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the engine's control operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A run is already active; stop it first")]
    AlreadyRunning,

    #[error("No run is active")]
    NotRunning,

    #[error("Cannot start a run with no prompts")]
    EmptyInput,

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine is shut down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_state_type() {
        assert_eq!(ItemStatus::Queued.state_type(), "queued");
        assert_eq!(ItemStatus::Downloading.state_type(), "downloading");
        assert_eq!(
            ItemStatus::Error {
                message: "boom".to_string()
            }
            .state_type(),
            "error"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(ItemStatus::Done.is_terminal());
        assert!(ItemStatus::Error {
            message: String::new()
        }
        .is_terminal());
        assert!(!ItemStatus::Queued.is_terminal());
        assert!(!ItemStatus::Waiting.is_terminal());
    }

    #[test]
    fn test_slot_occupancy() {
        assert!(ItemStatus::Assigned.occupies_slot());
        assert!(ItemStatus::Submitted.occupies_slot());
        assert!(ItemStatus::Waiting.occupies_slot());
        assert!(!ItemStatus::Queued.occupies_slot());
        assert!(!ItemStatus::Downloading.occupies_slot());
        assert!(!ItemStatus::Done.occupies_slot());
    }

    #[test]
    fn test_status_serialization() {
        let status = ItemStatus::Error {
            message: "context closed".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("context closed"));

        let back: ItemStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_new_item_is_queued() {
        let item = WorkItem::new(3, "a quiet harbor at dawn");
        assert_eq!(item.index, 3);
        assert_eq!(item.status, ItemStatus::Queued);
    }

    #[test]
    fn test_forward_transitions() {
        let mut item = WorkItem::new(0, "p");
        assert!(item.mark_assigned());
        assert!(item.mark_submitted());
        assert!(item.mark_waiting());
        assert!(item.mark_downloading());
        assert!(item.mark_done());
        assert_eq!(item.status, ItemStatus::Done);
    }

    #[test]
    fn test_no_backward_transitions() {
        let mut item = WorkItem::new(0, "p");
        item.mark_assigned();
        item.mark_submitted();
        assert!(!item.mark_assigned());
        assert!(!item.mark_submitted());
        assert_eq!(item.status, ItemStatus::Submitted);
    }

    #[test]
    fn test_waiting_skips_submitted() {
        let mut item = WorkItem::new(0, "p");
        item.mark_assigned();
        assert!(item.mark_waiting());
        assert_eq!(item.status, ItemStatus::Waiting);
    }

    #[test]
    fn test_terminal_states_absorb() {
        let mut item = WorkItem::new(0, "p");
        item.mark_assigned();
        assert!(item.mark_error("boom"));
        assert!(!item.mark_done());
        assert!(!item.mark_error("again"));
        assert!(!item.mark_downloading());
        assert_eq!(
            item.status,
            ItemStatus::Error {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_downloading_requires_slot_state() {
        let mut item = WorkItem::new(0, "p");
        assert!(!item.mark_downloading());
        item.mark_assigned();
        assert!(item.mark_downloading());
        assert!(!item.mark_downloading());
    }
}
