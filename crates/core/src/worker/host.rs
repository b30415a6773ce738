//! The execution-context seam.

use async_trait::async_trait;

use super::types::{DriverCommand, WorkerHostError, WorkerId};

/// Opens, drives and closes execution contexts.
///
/// One context serves one work item at a time. Contexts run isolated from
/// the engine; every operation here is a message to the host, never a
/// direct state mutation. Implementations must tolerate operations on
/// already-closed workers by returning `WorkerHostError::NotFound`.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Open a new execution context in the background and return its id.
    async fn open(&self) -> Result<WorkerId, WorkerHostError>;

    /// Inject the automation driver into a ready context.
    async fn inject(&self, worker: WorkerId) -> Result<(), WorkerHostError>;

    /// Deliver a command to the driver inside a context.
    async fn deliver(&self, worker: WorkerId, command: DriverCommand)
        -> Result<(), WorkerHostError>;

    /// Bring a context to the foreground so UI-gated driver steps can run.
    async fn focus(&self, worker: WorkerId) -> Result<(), WorkerHostError>;

    /// Close a context. Closing an unknown worker is not an error for
    /// callers; the engine ignores `NotFound` on teardown.
    async fn close(&self, worker: WorkerId) -> Result<(), WorkerHostError>;
}
