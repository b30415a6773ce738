use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Engine timers that drive spawned loops are non-zero
/// - Snapshot window fits inside the activity-log ring
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.engine.rotate_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "engine.rotate_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.engine.assign_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.assign_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.engine.snapshot_recent > config.engine.recent_log_cap {
        return Err(ConfigError::ValidationError(
            "engine.snapshot_recent cannot exceed engine.recent_log_cap".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_zero_rotate_interval_fails() {
        let mut config = Config::default();
        config.engine.rotate_interval_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_snapshot_window_bound() {
        let mut config = Config::default();
        config.engine.recent_log_cap = 10;
        config.engine.snapshot_recent = 20;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
