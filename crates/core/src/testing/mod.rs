//! Testing utilities and mock implementations.
//!
//! Mocks for the two external seams the engine talks to, the worker host
//! and the artifact store, so engine behavior can be tested end to end
//! without a browser-automation host or real transfers.
//!
//! # Example
//!
//! ```rust,ignore
//! use atelier_core::testing::{fixtures, MockArtifactStore, MockWorkerHost};
//!
//! let host = Arc::new(MockWorkerHost::new());
//! let store = Arc::new(MockArtifactStore::new());
//! let handle = spawn_engine(fixtures::fast_config(), options, host.clone(), |_| store);
//!
//! handle.start(fixtures::start_request(3)).await?;
//! // drive the run through host and handle events...
//! ```

mod mock_artifact_store;
mod mock_worker_host;

pub use mock_artifact_store::MockArtifactStore;
pub use mock_worker_host::MockWorkerHost;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::engine::{ConcurrencyMode, EngineConfig, StartRequest};

    /// Engine config with millisecond-scale timers so suites stay fast.
    pub fn fast_config() -> EngineConfig {
        EngineConfig {
            assign_timeout_secs: 30,
            rotate_interval_ms: 20,
            settle_delay_ms: 1,
            tick_min_interval_ms: 10,
            tick_max_attempts: 3,
            ..EngineConfig::default()
        }
    }

    /// A capped start request with `count` numbered prompts.
    pub fn start_request(count: usize) -> StartRequest {
        StartRequest {
            prompts: (1..=count).map(|i| format!("scene {i}")).collect(),
            mode: ConcurrencyMode::Capped,
            cap: 8,
            output_folder: "assets/images".to_string(),
        }
    }

    /// Same as [`start_request`] but with an explicit concurrency cap.
    pub fn capped_request(count: usize, cap: usize) -> StartRequest {
        StartRequest {
            cap,
            ..start_request(count)
        }
    }
}
