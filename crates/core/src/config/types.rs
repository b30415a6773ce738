use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::engine::EngineConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory of the static dashboard bundle.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("dashboard")
}

/// On-disk locations: artifact output root and the options file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory artifacts are written under; the per-run output
    /// folder is relative to this.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// TOML file holding the persisted prompt options.
    #[serde(default = "default_options_path")]
    pub options_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            options_path: default_options_path(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_options_path() -> PathBuf {
    PathBuf::from("options.toml")
}

/// Config projection for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: SanitizedServerConfig,
    pub engine: EngineConfig,
    pub storage: SanitizedStorageConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub output_root: String,
    pub options_path: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: SanitizedServerConfig {
                host: config.server.host.to_string(),
                port: config.server.port,
                static_dir: config.server.static_dir.display().to_string(),
            },
            engine: config.engine.clone(),
            storage: SanitizedStorageConfig {
                output_root: config.storage.output_root.display().to_string(),
                options_path: config.storage.options_path.display().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.engine.assign_timeout_secs, 60);
        assert_eq!(config.storage.output_root.to_str().unwrap(), "output");
        assert_eq!(config.storage.options_path.to_str().unwrap(), "options.toml");
    }

    #[test]
    fn test_deserialize_overrides() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[engine]
rotate_interval_ms = 500

[storage]
output_root = "/data/artifacts"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.engine.rotate_interval_ms, 500);
        assert_eq!(config.engine.assign_timeout_secs, 60);
        assert_eq!(config.storage.output_root.to_str().unwrap(), "/data/artifacts");
    }

    #[test]
    fn test_sanitized_config() {
        let config = Config::default();
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.server.host, "0.0.0.0");
        assert_eq!(sanitized.server.port, 8080);
        assert_eq!(sanitized.storage.output_root, "output");
        assert_eq!(sanitized.engine.default_cap, 8);
    }
}
