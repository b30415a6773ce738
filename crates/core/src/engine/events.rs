//! Engine message queue and progress stream types.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::transport::{DownloadSource, DownloadState, NameDecision};
use crate::worker::WorkerId;

use super::config::StartRequest;
use super::types::{EngineError, RunSnapshot};

/// Everything the engine task can be asked to do or told about.
///
/// All engine state lives behind one queue of these messages; handlers
/// run to completion before the next message is serviced, which is what
/// makes the engine lock-free.
#[derive(Debug)]
pub enum EngineMsg {
    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------
    Start {
        request: StartRequest,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Stop {
        reason: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<RunSnapshot>,
    },

    // ------------------------------------------------------------------
    // Reported by the automation driver, via its worker
    // ------------------------------------------------------------------
    /// The driver confirmed the prompt was sent to the remote document.
    Submitted { worker: WorkerId, index: usize },
    /// The driver gave up on its current step.
    ItemError { index: usize, message: String },
    /// The remote document demands authentication; pauses the whole run.
    LoginRequired { index: usize },
    /// Push an expected-next-artifact hint for this worker.
    RegisterExpectedArtifact { worker: WorkerId, index: usize },
    /// Direct handoff: the driver captured the artifact source itself.
    ArtifactPayload {
        worker: WorkerId,
        index: usize,
        source: DownloadSource,
    },

    // ------------------------------------------------------------------
    // Reported by the artifact transport
    // ------------------------------------------------------------------
    ArtifactCreated {
        artifact_id: String,
        origin: WorkerId,
    },
    /// Must be answered before the transport writes the artifact; the
    /// reply channel carries the naming decision back synchronously.
    DetermineFinalName {
        artifact_id: String,
        suggested_name: String,
        mime: Option<String>,
        reply: oneshot::Sender<NameDecision>,
    },
    TransportState {
        artifact_id: String,
        state: DownloadState,
    },

    // ------------------------------------------------------------------
    // Reported by the worker host
    // ------------------------------------------------------------------
    /// An execution context was closed outside the engine's control.
    ContextClosed { worker: WorkerId },

    // ------------------------------------------------------------------
    // Internal: completions of spawned host calls and timers.
    // `run` guards against events from a previous run's timers.
    // ------------------------------------------------------------------
    ContextOpened {
        run: u64,
        index: usize,
        worker: WorkerId,
    },
    OpenFailed {
        run: u64,
        index: usize,
        message: String,
    },
    InjectionComplete { worker: WorkerId },
    InjectionFailed { worker: WorkerId, message: String },
    AssignTimeout { run: u64, index: usize },
    RotateTick,
}

/// Progress events pushed toward the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        total: usize,
    },
    Update {
        done: usize,
        total: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        item: Option<usize>,
    },
    Paused,
    Resumed,
    Stopped {
        reason: String,
    },
    Completed {
        done: usize,
        total: usize,
    },
}
