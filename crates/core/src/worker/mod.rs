//! Execution-context handling: the host seam, the driver protocol and
//! retry gating.

mod host;
mod retry;
mod types;

pub use host::WorkerHost;
pub use retry::RetryGate;
pub use types::{DriverCommand, WorkerHostError, WorkerId};
