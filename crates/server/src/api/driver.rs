//! Automation-driver bridge.
//!
//! The automation surface connects over a single WebSocket. [`DriverHost`]
//! implements [`WorkerHost`] by relaying host calls as JSON commands over
//! that socket and matching replies by request id; reports coming back
//! from the driver (submissions, errors, artifact payloads) are forwarded
//! straight into the engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use atelier_core::{
    DownloadSource, DriverCommand, EngineHandle, WorkerHost, WorkerHostError, WorkerId,
};

use crate::metrics::DRIVER_CONNECTED;
use crate::state::AppState;

/// Commands relayed from the host to the connected driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Open { req: String },
    Inject { req: String, worker: WorkerId },
    Deliver { worker: WorkerId, command: DriverCommand },
    Focus { worker: WorkerId },
    Close { worker: WorkerId },
}

/// Messages the driver sends back: replies to host requests plus
/// unsolicited reports destined for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverMessage {
    Opened { req: String, worker: WorkerId },
    OpenFailed { req: String, message: String },
    Injected { req: String },
    InjectFailed { req: String, message: String },
    Submitted { worker: WorkerId, index: usize },
    ItemError { index: usize, message: String },
    LoginRequired { index: usize },
    ExpectArtifact { worker: WorkerId, index: usize },
    ArtifactPayload {
        worker: WorkerId,
        index: usize,
        source: DownloadSource,
    },
    ContextClosed { worker: WorkerId },
}

type OpenReply = oneshot::Sender<Result<WorkerId, WorkerHostError>>;
type InjectReply = oneshot::Sender<Result<(), WorkerHostError>>;

/// [`WorkerHost`] backed by one connected automation driver.
///
/// At most one driver is active; a new connection displaces the previous
/// one and fails its in-flight requests. With no driver connected every
/// operation reports `Unavailable`, which the engine turns into per-item
/// failures rather than a crashed run.
#[derive(Debug, Default)]
pub struct DriverHost {
    generation: AtomicU64,
    outbound: Mutex<Option<(u64, mpsc::UnboundedSender<HostMessage>)>>,
    pending_opens: Mutex<HashMap<String, OpenReply>>,
    pending_injects: Mutex<HashMap<String, (WorkerId, InjectReply)>>,
}

impl DriverHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected driver, displacing any previous one.
    /// Returns the connection generation and the command stream to pump
    /// into the socket.
    fn attach(&self) -> (u64, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.outbound.lock().unwrap().replace((generation, tx));
        if previous.is_some() {
            warn!("new driver connection displaces the previous one");
        }
        self.fail_pending();
        DRIVER_CONNECTED.set(1);
        (generation, rx)
    }

    /// Unregister a disconnected driver. A stale generation is a no-op;
    /// the connection was already displaced.
    fn detach(&self, generation: u64) {
        let mut outbound = self.outbound.lock().unwrap();
        match *outbound {
            Some((current, _)) if current == generation => {
                *outbound = None;
                DRIVER_CONNECTED.set(0);
            }
            _ => return,
        }
        drop(outbound);
        self.fail_pending();
    }

    /// Drop all pending replies; their waiters observe `Unavailable`.
    fn fail_pending(&self) {
        self.pending_opens.lock().unwrap().clear();
        self.pending_injects.lock().unwrap().clear();
    }

    fn send(&self, message: HostMessage) -> Result<(), WorkerHostError> {
        let outbound = self.outbound.lock().unwrap();
        let Some((_, tx)) = outbound.as_ref() else {
            return Err(WorkerHostError::Unavailable(
                "no driver connected".to_string(),
            ));
        };
        tx.send(message)
            .map_err(|_| WorkerHostError::Unavailable("driver connection lost".to_string()))
    }

    /// Complete pending replies and forward driver reports to the engine.
    fn apply(&self, engine: &EngineHandle, message: DriverMessage) {
        match message {
            DriverMessage::Opened { req, worker } => {
                match self.pending_opens.lock().unwrap().remove(&req) {
                    Some(reply) => {
                        let _ = reply.send(Ok(worker));
                    }
                    None => debug!(req, "stale open reply ignored"),
                }
            }
            DriverMessage::OpenFailed { req, message } => {
                if let Some(reply) = self.pending_opens.lock().unwrap().remove(&req) {
                    let _ = reply.send(Err(WorkerHostError::OpenFailed(message)));
                }
            }
            DriverMessage::Injected { req } => {
                if let Some((_, reply)) = self.pending_injects.lock().unwrap().remove(&req) {
                    let _ = reply.send(Ok(()));
                }
            }
            DriverMessage::InjectFailed { req, message } => {
                if let Some((worker, reply)) = self.pending_injects.lock().unwrap().remove(&req) {
                    let _ = reply.send(Err(WorkerHostError::InjectionFailed { worker, message }));
                }
            }
            DriverMessage::Submitted { worker, index } => engine.submitted(worker, index),
            DriverMessage::ItemError { index, message } => engine.item_error(index, message),
            DriverMessage::LoginRequired { index } => engine.login_required(index),
            DriverMessage::ExpectArtifact { worker, index } => {
                engine.register_expected_artifact(worker, index)
            }
            DriverMessage::ArtifactPayload {
                worker,
                index,
                source,
            } => engine.artifact_payload(worker, index, source),
            DriverMessage::ContextClosed { worker } => engine.context_closed(worker),
        }
    }
}

#[async_trait]
impl WorkerHost for DriverHost {
    async fn open(&self) -> Result<WorkerId, WorkerHostError> {
        let req = Uuid::new_v4().to_string();
        let (reply, rx) = oneshot::channel();
        self.pending_opens
            .lock()
            .unwrap()
            .insert(req.clone(), reply);
        if let Err(e) = self.send(HostMessage::Open { req: req.clone() }) {
            self.pending_opens.lock().unwrap().remove(&req);
            return Err(e);
        }
        rx.await
            .map_err(|_| WorkerHostError::Unavailable("driver connection lost".to_string()))?
    }

    async fn inject(&self, worker: WorkerId) -> Result<(), WorkerHostError> {
        let req = Uuid::new_v4().to_string();
        let (reply, rx) = oneshot::channel();
        self.pending_injects
            .lock()
            .unwrap()
            .insert(req.clone(), (worker, reply));
        if let Err(e) = self.send(HostMessage::Inject {
            req: req.clone(),
            worker,
        }) {
            self.pending_injects.lock().unwrap().remove(&req);
            return Err(e);
        }
        rx.await
            .map_err(|_| WorkerHostError::Unavailable("driver connection lost".to_string()))?
    }

    async fn deliver(
        &self,
        worker: WorkerId,
        command: DriverCommand,
    ) -> Result<(), WorkerHostError> {
        self.send(HostMessage::Deliver { worker, command })
    }

    async fn focus(&self, worker: WorkerId) -> Result<(), WorkerHostError> {
        self.send(HostMessage::Focus { worker })
    }

    async fn close(&self, worker: WorkerId) -> Result<(), WorkerHostError> {
        self.send(HostMessage::Close { worker })
    }
}

pub async fn driver_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_driver(socket, state))
}

async fn handle_driver(socket: WebSocket, state: Arc<AppState>) {
    let host = state.driver_host();
    let engine = state.engine().clone();
    let (generation, mut commands) = host.attach();
    info!("automation driver connected");

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = commands.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "failed to serialize host command");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<DriverMessage>(&text) {
                Ok(message) => host.apply(&engine, message),
                Err(e) => warn!(error = %e, "ignoring malformed driver message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    host.detach(generation);
    info!("automation driver disconnected");
}
