//! Run orchestration: admission, item lifecycle, identity binding and
//! foreground rotation, all behind one message-driven task.

mod binder;
mod config;
mod events;
mod handle;
mod rotator;
mod runner;
mod types;

pub use binder::{infer_ext, item_label, output_name, IdentityBinder};
pub use config::{pad_width, EngineConfig, RunConfig, StartRequest};
pub use events::{EngineMsg, ProgressEvent};
pub use handle::EngineHandle;
pub use rotator::Rotator;
pub use runner::spawn_engine;
pub use types::{
    ConcurrencyMode, EngineError, ItemStatus, LogEntry, RunSnapshot, WorkItem,
};
