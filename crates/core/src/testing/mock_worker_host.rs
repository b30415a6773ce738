//! In-memory worker host for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::worker::{DriverCommand, WorkerHost, WorkerHostError, WorkerId};

/// A [`WorkerHost`] that mints worker ids and records every call.
///
/// Contexts "open" instantly; tests observe the resulting command traffic
/// through the recording accessors and can script open/injection failures
/// up front.
#[derive(Debug, Default)]
pub struct MockWorkerHost {
    next_id: AtomicU64,
    hold_opens: AtomicBool,
    open: RwLock<HashSet<WorkerId>>,
    open_failures: RwLock<Vec<String>>,
    injection_failures: RwLock<Vec<String>>,
    delivered: RwLock<Vec<(WorkerId, DriverCommand)>>,
    focused: RwLock<Vec<WorkerId>>,
    closed: RwLock<Vec<WorkerId>>,
}

impl MockWorkerHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next `open` call. Failures are consumed in
    /// FIFO order before successful opens resume.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.open_failures.write().unwrap().push(message.into());
    }

    /// Make every subsequent `open` call pend forever, for timeout tests.
    pub fn hold_opens(&self) {
        self.hold_opens.store(true, Ordering::SeqCst);
    }

    /// Queue a failure for the next `inject` call.
    pub fn fail_next_injection(&self, message: impl Into<String>) {
        self.injection_failures.write().unwrap().push(message.into());
    }

    /// All commands delivered so far, in order.
    pub fn delivered(&self) -> Vec<(WorkerId, DriverCommand)> {
        self.delivered.read().unwrap().clone()
    }

    /// Commands of one kind delivered to any worker.
    pub fn delivered_run_prompts(&self) -> Vec<(WorkerId, usize, String)> {
        self.delivered
            .read()
            .unwrap()
            .iter()
            .filter_map(|(worker, command)| match command {
                DriverCommand::RunPrompt { index, payload } => {
                    Some((*worker, *index, payload.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn focused(&self) -> Vec<WorkerId> {
        self.focused.read().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<WorkerId> {
        self.closed.read().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.open.read().unwrap().len()
    }

    pub fn is_open(&self, worker: WorkerId) -> bool {
        self.open.read().unwrap().contains(&worker)
    }
}

#[async_trait]
impl WorkerHost for MockWorkerHost {
    async fn open(&self) -> Result<WorkerId, WorkerHostError> {
        if self.hold_opens.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(message) = pop_front(&self.open_failures) {
            return Err(WorkerHostError::OpenFailed(message));
        }
        let worker = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.open.write().unwrap().insert(worker);
        Ok(worker)
    }

    async fn inject(&self, worker: WorkerId) -> Result<(), WorkerHostError> {
        if !self.is_open(worker) {
            return Err(WorkerHostError::NotFound(worker));
        }
        if let Some(message) = pop_front(&self.injection_failures) {
            return Err(WorkerHostError::InjectionFailed { worker, message });
        }
        Ok(())
    }

    async fn deliver(
        &self,
        worker: WorkerId,
        command: DriverCommand,
    ) -> Result<(), WorkerHostError> {
        if !self.is_open(worker) {
            return Err(WorkerHostError::NotFound(worker));
        }
        self.delivered.write().unwrap().push((worker, command));
        Ok(())
    }

    async fn focus(&self, worker: WorkerId) -> Result<(), WorkerHostError> {
        if !self.is_open(worker) {
            return Err(WorkerHostError::NotFound(worker));
        }
        self.focused.write().unwrap().push(worker);
        Ok(())
    }

    async fn close(&self, worker: WorkerId) -> Result<(), WorkerHostError> {
        if !self.open.write().unwrap().remove(&worker) {
            return Err(WorkerHostError::NotFound(worker));
        }
        self.closed.write().unwrap().push(worker);
        Ok(())
    }
}

fn pop_front(queue: &RwLock<Vec<String>>) -> Option<String> {
    let mut queue = queue.write().unwrap();
    if queue.is_empty() {
        None
    } else {
        Some(queue.remove(0))
    }
}
