//! The orchestration engine task.
//!
//! One spawned task owns every piece of run state and drains one message
//! queue; see [`EngineMsg`] for the full surface. Host calls, timers and
//! transfers run in their own spawned tasks and report back through the
//! queue, so no handler ever blocks the loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::options::{OptionsStore, PromptOptions};
use crate::transport::{ArtifactStore, DownloadSource, DownloadState, NameDecision};
use crate::worker::{DriverCommand, RetryGate, WorkerHost, WorkerHostError, WorkerId};

use super::binder::{item_label, output_name, IdentityBinder};
use super::config::{EngineConfig, RunConfig, StartRequest};
use super::events::{EngineMsg, ProgressEvent};
use super::handle::EngineHandle;
use super::rotator::Rotator;
use super::types::{EngineError, ItemStatus, LogEntry, RunSnapshot, WorkItem};

/// Spawn the engine task and return its handle.
///
/// `make_store` receives the handle before the engine starts so a
/// transport can report into the engine it serves; see
/// [`FsArtifactStore`](crate::transport::FsArtifactStore).
pub fn spawn_engine(
    config: EngineConfig,
    options_store: OptionsStore,
    host: Arc<dyn WorkerHost>,
    make_store: impl FnOnce(&EngineHandle) -> Arc<dyn ArtifactStore>,
) -> EngineHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (progress, _) = broadcast::channel(256);
    let handle = EngineHandle::new(tx.clone(), progress.clone());
    let store = make_store(&handle);

    let engine = Engine {
        config,
        options_store,
        host,
        store,
        rx,
        tx,
        progress,
        active: false,
        paused: false,
        run_seq: 0,
        run_config: None,
        options: PromptOptions::default(),
        items: Vec::new(),
        workers: HashMap::new(),
        worker_order: Vec::new(),
        binder: IdentityBinder::new(),
        rotator: Rotator::new(),
        recent: VecDeque::new(),
        completed_emitted: false,
        run_started_at: None,
        ticker: None,
    };
    tokio::spawn(engine.run());
    handle
}

/// One claimed worker slot: the item it serves and its retry gate.
#[derive(Debug)]
struct WorkerSlot {
    index: usize,
    gate: RetryGate,
}

struct Engine {
    config: EngineConfig,
    options_store: OptionsStore,
    host: Arc<dyn WorkerHost>,
    store: Arc<dyn ArtifactStore>,
    rx: mpsc::UnboundedReceiver<EngineMsg>,
    /// Kept for spawned host calls and timers to report back through.
    tx: mpsc::UnboundedSender<EngineMsg>,
    progress: broadcast::Sender<ProgressEvent>,

    active: bool,
    paused: bool,
    /// Bumped at every start; stale timer and open completions carry the
    /// old value and are dropped.
    run_seq: u64,
    run_config: Option<RunConfig>,
    options: PromptOptions,
    items: Vec<WorkItem>,
    workers: HashMap<WorkerId, WorkerSlot>,
    /// Insertion order of live workers, the rotator's candidate order.
    worker_order: Vec<WorkerId>,
    binder: IdentityBinder,
    rotator: Rotator,
    recent: VecDeque<LogEntry>,
    completed_emitted: bool,
    run_started_at: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
}

impl Engine {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.handle_msg(msg);
        }
        self.stop_ticker();
    }

    fn handle_msg(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Start { request, reply } => self.handle_start(request, reply),
            EngineMsg::Pause { reply } => {
                let _ = reply.send(self.handle_pause());
            }
            EngineMsg::Resume { reply } => {
                let _ = reply.send(self.handle_resume());
            }
            EngineMsg::Stop { reason, reply } => {
                let _ = reply.send(self.handle_stop(reason));
            }
            EngineMsg::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }

            EngineMsg::Submitted { worker, index } => self.handle_submitted(worker, index),
            EngineMsg::ItemError { index, message } => {
                if self.active {
                    self.fail_item(index, message, "driver");
                }
            }
            EngineMsg::LoginRequired { index } => self.handle_login_required(index),
            EngineMsg::RegisterExpectedArtifact { worker, index } => {
                if self.active {
                    self.binder.push_hint(worker, index);
                }
            }
            EngineMsg::ArtifactPayload {
                worker,
                index,
                source,
            } => self.handle_artifact_payload(worker, index, source),

            EngineMsg::ArtifactCreated {
                artifact_id,
                origin,
            } => self.handle_artifact_created(artifact_id, origin),
            EngineMsg::DetermineFinalName {
                artifact_id,
                suggested_name,
                mime,
                reply,
            } => {
                let _ = reply.send(self.final_name(&artifact_id, &suggested_name, mime.as_deref()));
            }
            EngineMsg::TransportState { artifact_id, state } => {
                self.handle_transport_state(&artifact_id, state)
            }

            EngineMsg::ContextClosed { worker } => self.handle_context_closed(worker),

            EngineMsg::ContextOpened { run, index, worker } => {
                self.handle_context_opened(run, index, worker)
            }
            EngineMsg::OpenFailed {
                run,
                index,
                message,
            } => {
                if run == self.run_seq && self.active {
                    self.fail_item(index, format!("Context open failed: {message}"), "open");
                }
            }
            EngineMsg::InjectionComplete { worker } => self.handle_injection_complete(worker),
            EngineMsg::InjectionFailed { worker, message } => {
                self.handle_injection_failed(worker, message)
            }
            EngineMsg::AssignTimeout { run, index } => self.handle_assign_timeout(run, index),
            EngineMsg::RotateTick => self.handle_rotate_tick(),
        }
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    fn handle_start(
        &mut self,
        request: StartRequest,
        reply: oneshot::Sender<Result<(), EngineError>>,
    ) {
        let result = self.start_run(request);
        let ok = result.is_ok();
        let _ = reply.send(result);
        if ok {
            self.pump();
            self.start_ticker();
        }
    }

    fn start_run(&mut self, request: StartRequest) -> Result<(), EngineError> {
        if self.active {
            return Err(EngineError::AlreadyRunning);
        }
        if request.prompts.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        if request.cap == 0 {
            return Err(EngineError::InvalidConfig(
                "concurrency cap must be at least 1".to_string(),
            ));
        }
        self.options = self
            .options_store
            .load()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        self.run_seq += 1;
        self.items = request
            .prompts
            .iter()
            .enumerate()
            .map(|(index, prompt)| WorkItem::new(index, prompt.clone()))
            .collect();
        self.run_config = Some(RunConfig::from_request(&request));
        self.workers.clear();
        self.worker_order.clear();
        self.binder.reset();
        self.rotator.reset();
        self.recent.clear();
        self.completed_emitted = false;
        self.paused = false;
        self.active = true;
        self.run_started_at = Some(Instant::now());

        let total = self.items.len();
        metrics::RUNS_STARTED.inc();
        info!(total, "run started");
        self.log(format!("Run started: {total} items"));
        let _ = self.progress.send(ProgressEvent::Started { total });
        Ok(())
    }

    fn handle_pause(&mut self) -> Result<(), EngineError> {
        if !self.active {
            return Err(EngineError::NotRunning);
        }
        if !self.paused {
            self.paused = true;
            self.stop_ticker();
            self.log("Run paused");
            let _ = self.progress.send(ProgressEvent::Paused);
        }
        Ok(())
    }

    fn handle_resume(&mut self) -> Result<(), EngineError> {
        if !self.active {
            return Err(EngineError::NotRunning);
        }
        if self.paused {
            self.paused = false;
            self.log("Run resumed");
            let _ = self.progress.send(ProgressEvent::Resumed);
            self.pump();
            self.start_ticker();
        }
        Ok(())
    }

    fn handle_stop(&mut self, reason: String) -> Result<(), EngineError> {
        if !self.active {
            return Err(EngineError::NotRunning);
        }
        self.active = false;
        self.paused = false;
        self.stop_ticker();
        metrics::RUNS_FINISHED.with_label_values(&["stopped"]).inc();

        for worker in std::mem::take(&mut self.worker_order) {
            self.spawn_close(worker);
        }
        self.workers.clear();
        self.binder.reset();
        self.rotator.reset();
        self.items.clear();
        self.run_config = None;
        self.run_started_at = None;

        info!(%reason, "run stopped");
        self.log(format!("Run stopped: {reason}"));
        let _ = self.progress.send(ProgressEvent::Stopped { reason });
        Ok(())
    }

    fn snapshot(&self) -> RunSnapshot {
        let skip = self
            .recent
            .len()
            .saturating_sub(self.config.snapshot_recent);
        RunSnapshot {
            running: self.active && !self.paused,
            paused: self.active && self.paused,
            done: self.done_count(),
            total: self.items.len(),
            recent: self.recent.iter().skip(skip).cloned().collect(),
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit queued items while slots are free. Every state change that
    /// can vacate a slot ends here.
    fn pump(&mut self) {
        if !self.active || self.paused {
            return;
        }
        let Some(cap) = self.run_config.as_ref().map(RunConfig::active_cap) else {
            return;
        };
        loop {
            let occupied = self
                .items
                .iter()
                .filter(|item| item.status.occupies_slot())
                .count();
            if occupied >= cap {
                return;
            }
            let Some(index) = self
                .items
                .iter()
                .position(|item| item.status == ItemStatus::Queued)
            else {
                return;
            };
            self.assign(index);
        }
    }

    fn assign(&mut self, index: usize) {
        if !self.items[index].mark_assigned() {
            return;
        }
        let note = format!("#{} assigned", self.label(index));
        self.log(note.clone());
        self.emit_update(Some(note), Some(index));

        let run = self.run_seq;
        let host = self.host.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match host.open().await {
                Ok(worker) => {
                    let _ = tx.send(EngineMsg::ContextOpened { run, index, worker });
                }
                Err(err) => {
                    let _ = tx.send(EngineMsg::OpenFailed {
                        run,
                        index,
                        message: err.to_string(),
                    });
                }
            }
        });

        let tx = self.tx.clone();
        let timeout = Duration::from_secs(self.config.assign_timeout_secs);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(EngineMsg::AssignTimeout { run, index });
        });
    }

    fn handle_context_opened(&mut self, run: u64, index: usize, worker: WorkerId) {
        if run != self.run_seq || !self.active {
            self.spawn_close(worker);
            return;
        }
        if self.items[index].status != ItemStatus::Assigned {
            // The item moved on (timed out, errored) while the context
            // was opening.
            self.spawn_close(worker);
            return;
        }
        let gate = RetryGate::new(
            Duration::from_millis(self.config.tick_min_interval_ms),
            self.config.tick_max_attempts,
        );
        self.workers.insert(worker, WorkerSlot { index, gate });
        self.worker_order.push(worker);

        let host = self.host.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match host.inject(worker).await {
                Ok(()) => {
                    let _ = tx.send(EngineMsg::InjectionComplete { worker });
                }
                Err(err) => {
                    let _ = tx.send(EngineMsg::InjectionFailed {
                        worker,
                        message: err.to_string(),
                    });
                }
            }
        });
    }

    fn handle_injection_complete(&mut self, worker: WorkerId) {
        let Some(slot) = self.workers.get(&worker) else {
            return;
        };
        let index = slot.index;
        if !self.items[index].mark_submitted() {
            return;
        }
        let payload = self.options.compose(&self.items[index].payload);
        let host = self.host.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let command = DriverCommand::RunPrompt { index, payload };
            if let Err(err) = host.deliver(worker, command).await {
                let _ = tx.send(EngineMsg::ItemError {
                    index,
                    message: format!("Prompt delivery failed: {err}"),
                });
            }
        });
    }

    fn handle_injection_failed(&mut self, worker: WorkerId, message: String) {
        let Some(slot) = self.workers.get(&worker) else {
            return;
        };
        let index = slot.index;
        self.fail_item(
            index,
            format!("Driver injection failed: {message}"),
            "injection",
        );
    }

    fn handle_assign_timeout(&mut self, run: u64, index: usize) {
        if run != self.run_seq || !self.active {
            return;
        }
        // Only fires on items still stuck before submission.
        if self.items[index].status == ItemStatus::Assigned {
            self.fail_item(index, "Context load timeout", "timeout");
        }
    }

    // ------------------------------------------------------------------
    // Driver reports
    // ------------------------------------------------------------------

    fn handle_submitted(&mut self, worker: WorkerId, index: usize) {
        if !self.active {
            return;
        }
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        if !item.mark_waiting() {
            return;
        }
        let note = format!("#{} submitted", self.label(index));
        self.log(note.clone());
        self.emit_update(Some(note), Some(index));
        if let Some(slot) = self.workers.get_mut(&worker) {
            slot.gate.new_step();
        }
    }

    fn handle_login_required(&mut self, index: usize) {
        if !self.active {
            return;
        }
        warn!(index, "login required, pausing run");
        self.log(format!(
            "#{} needs login; run paused until resumed",
            self.label(index)
        ));
        if !self.paused {
            self.paused = true;
            self.stop_ticker();
            let _ = self.progress.send(ProgressEvent::Paused);
        }
    }

    fn handle_artifact_payload(&mut self, worker: WorkerId, index: usize, source: DownloadSource) {
        if !self.active {
            return;
        }
        self.binder.push_hint(worker, index);
        let store = self.store.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let Err(err) = store.begin(source, worker).await {
                let _ = tx.send(EngineMsg::ItemError {
                    index,
                    message: format!("Transfer failed to start: {err}"),
                });
            }
        });
    }

    // ------------------------------------------------------------------
    // Transport reports
    // ------------------------------------------------------------------

    fn handle_artifact_created(&mut self, artifact_id: String, origin: WorkerId) {
        if !self.active {
            return;
        }
        let assigned = self.workers.get(&origin).map(|slot| slot.index);
        let Some(index) = self.binder.resolve(origin, assigned) else {
            debug!(artifact_id, origin, "artifact with no resolvable item");
            metrics::ARTIFACTS_UNBOUND.inc();
            return;
        };
        if !self.binder.bind(&artifact_id, index) {
            debug!(artifact_id, index, "binding rejected, already taken");
            metrics::ARTIFACTS_UNBOUND.inc();
            return;
        }
        self.set_downloading(index);
    }

    fn set_downloading(&mut self, index: usize) {
        if !self.items[index].mark_downloading() {
            return;
        }
        let note = format!("#{} downloading", self.label(index));
        self.log(note.clone());
        self.emit_update(Some(note), Some(index));

        if let Some((&worker, slot)) = self
            .workers
            .iter_mut()
            .find(|(_, slot)| slot.index == index)
        {
            slot.gate.suppress();
            let host = self.host.clone();
            tokio::spawn(async move {
                let command = DriverCommand::DownloadStarted { index };
                if let Err(err) = host.deliver(worker, command).await {
                    if !matches!(err, WorkerHostError::NotFound(_)) {
                        warn!(worker, %err, "download-started delivery failed");
                    }
                }
            });
        }
    }

    fn final_name(
        &mut self,
        artifact_id: &str,
        suggested_name: &str,
        mime: Option<&str>,
    ) -> NameDecision {
        match (self.binder.index_for(artifact_id), self.run_config.as_ref()) {
            (Some(index), Some(run_config)) => {
                metrics::ARTIFACTS_NAMED.inc();
                NameDecision::Override {
                    name: output_name(run_config, index, suggested_name, mime),
                }
            }
            _ => NameDecision::LeaveAsIs,
        }
    }

    fn handle_transport_state(&mut self, artifact_id: &str, state: DownloadState) {
        let Some(index) = self.binder.consume(artifact_id) else {
            // Unknown or already-consumed artifact, e.g. a duplicate
            // terminal event.
            debug!(artifact_id, "transport state for unbound artifact");
            return;
        };
        match state {
            DownloadState::Complete => self.complete_item(index),
            DownloadState::Interrupted => self.fail_item(index, "Download interrupted", "transport"),
        }
    }

    // ------------------------------------------------------------------
    // Host reports
    // ------------------------------------------------------------------

    fn handle_context_closed(&mut self, worker: WorkerId) {
        let Some(slot) = self.workers.get(&worker) else {
            return;
        };
        let index = slot.index;
        self.remove_worker(worker);
        if self.active && !self.items[index].status.is_terminal() {
            self.fail_item(index, "Context closed", "context_lost");
        }
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    fn handle_rotate_tick(&mut self) {
        if !self.active || self.paused {
            return;
        }
        let candidates: Vec<WorkerId> = self
            .worker_order
            .iter()
            .copied()
            .filter(|worker| {
                self.workers
                    .get(worker)
                    .map(|slot| self.items[slot.index].status.occupies_slot())
                    .unwrap_or(false)
            })
            .collect();
        let Some(worker) = self.rotator.next(&candidates) else {
            return;
        };
        metrics::ROTATOR_FOCUS.inc();
        let deliver_tick = self
            .workers
            .get_mut(&worker)
            .map(|slot| slot.gate.try_arm())
            .unwrap_or(false);

        let host = self.host.clone();
        let settle = Duration::from_millis(self.config.settle_delay_ms);
        tokio::spawn(async move {
            if let Err(err) = host.focus(worker).await {
                if !matches!(err, WorkerHostError::NotFound(_)) {
                    warn!(worker, %err, "focus failed");
                }
                return;
            }
            if deliver_tick {
                tokio::time::sleep(settle).await;
                if let Err(err) = host.deliver(worker, DriverCommand::ForegroundTick).await {
                    if !matches!(err, WorkerHostError::NotFound(_)) {
                        warn!(worker, %err, "foreground tick delivery failed");
                    }
                }
            }
        });
    }

    fn start_ticker(&mut self) {
        self.stop_ticker();
        let tx = self.tx.clone();
        let interval = Duration::from_millis(self.config.rotate_interval_ms);
        self.ticker = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if tx.send(EngineMsg::RotateTick).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    // ------------------------------------------------------------------
    // Terminal transitions
    // ------------------------------------------------------------------

    fn complete_item(&mut self, index: usize) {
        let transitioned = self
            .items
            .get_mut(index)
            .map(WorkItem::mark_done)
            .unwrap_or(false);
        if !transitioned {
            return;
        }
        metrics::ITEMS_COMPLETED.inc();
        let note = format!("#{} done", self.label(index));
        self.log(note.clone());
        self.emit_update(Some(note), Some(index));
        self.teardown_worker_for(index);
        self.pump();
        self.check_completion();
    }

    fn fail_item(&mut self, index: usize, message: impl Into<String>, reason: &str) {
        let message = message.into();
        let transitioned = self
            .items
            .get_mut(index)
            .map(|item| item.mark_error(&message))
            .unwrap_or(false);
        if !transitioned {
            return;
        }
        metrics::ITEMS_FAILED.with_label_values(&[reason]).inc();
        let note = format!("#{} error: {message}", self.label(index));
        self.log(note.clone());
        self.emit_update(Some(note), Some(index));
        self.teardown_worker_for(index);
        self.binder.forget_index(index);
        self.pump();
        self.check_completion();
    }

    fn check_completion(&mut self) {
        if !self.active || self.completed_emitted {
            return;
        }
        if !self.items.iter().all(|item| item.status.is_terminal()) {
            return;
        }
        self.completed_emitted = true;
        self.active = false;
        self.paused = false;
        self.stop_ticker();

        let done = self.done_count();
        let total = self.items.len();
        metrics::RUNS_FINISHED
            .with_label_values(&["completed"])
            .inc();
        if let Some(started) = self.run_started_at.take() {
            metrics::RUN_DURATION.observe(started.elapsed().as_secs_f64());
        }
        info!(done, total, "run completed");
        self.log(format!("Run completed: {done}/{total} done"));
        let _ = self.progress.send(ProgressEvent::Completed { done, total });
    }

    // ------------------------------------------------------------------
    // Teardown and bookkeeping
    // ------------------------------------------------------------------

    fn teardown_worker_for(&mut self, index: usize) {
        let serving = self
            .workers
            .iter()
            .find(|(_, slot)| slot.index == index)
            .map(|(worker, _)| *worker);
        if let Some(worker) = serving {
            self.remove_worker(worker);
            self.spawn_close(worker);
        }
    }

    fn remove_worker(&mut self, worker: WorkerId) {
        self.workers.remove(&worker);
        self.worker_order.retain(|w| *w != worker);
        self.binder.forget_worker(worker);
    }

    fn spawn_close(&self, worker: WorkerId) {
        let host = self.host.clone();
        tokio::spawn(async move {
            if let Err(err) = host.close(worker).await {
                if !matches!(err, WorkerHostError::NotFound(_)) {
                    warn!(worker, %err, "context close failed");
                }
            }
        });
    }

    fn label(&self, index: usize) -> String {
        let padding = self
            .run_config
            .as_ref()
            .map(|run_config| run_config.padding)
            .unwrap_or(2);
        item_label(index, padding)
    }

    fn done_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Done)
            .count()
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        self.recent.push_back(LogEntry::now(message));
        while self.recent.len() > self.config.recent_log_cap {
            self.recent.pop_front();
        }
    }

    fn emit_update(&self, note: Option<String>, item: Option<usize>) {
        let _ = self.progress.send(ProgressEvent::Update {
            done: self.done_count(),
            total: self.items.len(),
            note,
            item,
        });
    }
}
