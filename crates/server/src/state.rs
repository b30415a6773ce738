//! Shared application state for the API layer.

use std::sync::Arc;

use atelier_core::{Config, EngineHandle, OptionsStore, SanitizedConfig};

use crate::api::driver::DriverHost;

/// Everything the request handlers need, shared behind an `Arc`.
pub struct AppState {
    config: Config,
    engine: EngineHandle,
    options_store: OptionsStore,
    driver_host: Arc<DriverHost>,
}

impl AppState {
    pub fn new(
        config: Config,
        engine: EngineHandle,
        options_store: OptionsStore,
        driver_host: Arc<DriverHost>,
    ) -> Self {
        Self {
            config,
            engine,
            options_store,
            driver_host,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn options_store(&self) -> &OptionsStore {
        &self.options_store
    }

    pub fn driver_host(&self) -> Arc<DriverHost> {
        Arc::clone(&self.driver_host)
    }

    /// Config projection safe to expose over the API.
    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }
}
