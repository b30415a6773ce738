//! Cloneable front door to the engine task.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::error;

use crate::transport::{DownloadSource, DownloadState, NameDecision, TransportEvents};
use crate::worker::WorkerId;

use super::config::StartRequest;
use super::events::{EngineMsg, ProgressEvent};
use super::types::{EngineError, RunSnapshot};

/// Handle to a spawned engine.
///
/// Control methods round-trip a reply through the engine queue; event
/// methods are fire-and-forget, mirroring how the reporting sides (driver
/// messages, host notifications) cannot wait on the engine. Cloning is
/// cheap; all clones feed the same engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMsg>,
    progress: broadcast::Sender<ProgressEvent>,
}

impl EngineHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<EngineMsg>,
        progress: broadcast::Sender<ProgressEvent>,
    ) -> Self {
        Self { tx, progress }
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    pub async fn start(&self, request: StartRequest) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMsg::Start { request, reply })
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMsg::Pause { reply })
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub async fn resume(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMsg::Resume { reply })
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub async fn stop(&self, reason: impl Into<String>) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMsg::Stop {
                reason: reason.into(),
                reply,
            })
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    pub async fn snapshot(&self) -> Result<RunSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineMsg::Snapshot { reply })
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Subscribe to the progress stream. Slow subscribers miss events
    /// rather than slowing the engine down.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    // ------------------------------------------------------------------
    // Driver and host reporting surface
    // ------------------------------------------------------------------

    pub fn submitted(&self, worker: WorkerId, index: usize) {
        self.send(EngineMsg::Submitted { worker, index });
    }

    pub fn item_error(&self, index: usize, message: impl Into<String>) {
        self.send(EngineMsg::ItemError {
            index,
            message: message.into(),
        });
    }

    pub fn login_required(&self, index: usize) {
        self.send(EngineMsg::LoginRequired { index });
    }

    pub fn register_expected_artifact(&self, worker: WorkerId, index: usize) {
        self.send(EngineMsg::RegisterExpectedArtifact { worker, index });
    }

    pub fn artifact_payload(&self, worker: WorkerId, index: usize, source: DownloadSource) {
        self.send(EngineMsg::ArtifactPayload {
            worker,
            index,
            source,
        });
    }

    pub fn context_closed(&self, worker: WorkerId) {
        self.send(EngineMsg::ContextClosed { worker });
    }

    fn send(&self, msg: EngineMsg) {
        if self.tx.send(msg).is_err() {
            error!("engine queue closed, event dropped");
        }
    }
}

#[async_trait]
impl TransportEvents for EngineHandle {
    async fn artifact_created(&self, artifact_id: &str, origin: WorkerId) {
        self.send(EngineMsg::ArtifactCreated {
            artifact_id: artifact_id.to_string(),
            origin,
        });
    }

    async fn determine_final_name(
        &self,
        artifact_id: &str,
        suggested_name: &str,
        mime: Option<&str>,
    ) -> NameDecision {
        let (reply, rx) = oneshot::channel();
        let msg = EngineMsg::DetermineFinalName {
            artifact_id: artifact_id.to_string(),
            suggested_name: suggested_name.to_string(),
            mime: mime.map(str::to_string),
            reply,
        };
        if self.tx.send(msg).is_err() {
            error!("engine queue closed, keeping suggested artifact name");
            return NameDecision::LeaveAsIs;
        }
        match rx.await {
            Ok(decision) => decision,
            Err(_) => {
                error!(artifact_id, "naming reply dropped, keeping suggested name");
                NameDecision::LeaveAsIs
            }
        }
    }

    async fn state_changed(&self, artifact_id: &str, state: DownloadState) {
        self.send(EngineMsg::TransportState {
            artifact_id: artifact_id.to_string(),
            state,
        });
    }
}
