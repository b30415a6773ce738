pub mod config;
pub mod engine;
pub mod metrics;
pub mod options;
pub mod testing;
pub mod transport;
pub mod worker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    ServerConfig, StorageConfig,
};
pub use engine::{
    spawn_engine, ConcurrencyMode, EngineConfig, EngineError, EngineHandle, ItemStatus,
    ProgressEvent, RunSnapshot, StartRequest, WorkItem,
};
pub use options::{OptionsError, OptionsStore, PromptOptions};
pub use transport::{
    ArtifactStore, DownloadSource, DownloadState, FsArtifactStore, NameDecision, TransportError,
    TransportEvents,
};
pub use worker::{DriverCommand, WorkerHost, WorkerHostError, WorkerId};
